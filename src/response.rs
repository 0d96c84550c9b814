//! # Response Module
//!
//! Defines the downloaded `Response` handed to the scraper. A response keeps
//! the `Request` it answers, so middlewares can read the request meta while
//! processing the spider's output.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use crate::request::Request;

#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The request this response answers.
    pub request: Request,
    pub flags: Vec<String>,
    // Set once the depth-less response has been counted at depth 0, so
    // repeated passes through the output chain count it only once.
    depth_counted: OnceLock<()>,
}

impl Response {
    /// Creates a `200 OK` response for `request`, with the request URL.
    pub fn new(request: Request) -> Self {
        Response {
            url: request.url.clone(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request,
            flags: Vec::new(),
            depth_counted: OnceLock::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Rebinds the response to another request.
    pub fn with_request(mut self, request: Request) -> Self {
        self.request = request;
        self
    }

    /// The meta of the originating request.
    pub fn meta(&self) -> &HashMap<String, Value> {
        &self.request.meta
    }

    /// Returns `true` the first time it is called on this response.
    pub(crate) fn mark_depth_counted(&self) -> bool {
        self.depth_counted.set(()).is_ok()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value decoded lossily.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.status.as_u16(), self.url)
    }
}
