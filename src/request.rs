//! # Request Module
//!
//! Defines the `Request` produced by spiders and consumed by the engine.
//!
//! A request carries the target URL, HTTP method, headers and body, plus a
//! free-form `meta` map that middlewares use to pass state along a crawl
//! (the link depth, the referrer policy, the HTTP statuses a callback wants
//! to see, ...).

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use url::Url;

use crate::error::SpiderError;

/// Meta key holding the link depth of a request.
pub const META_DEPTH: &str = "depth";
/// Meta key set on requests coming from the spider's start output.
pub const META_IS_START_REQUEST: &str = "is_start_request";
/// Meta key naming the referrer policy for a single request.
pub const META_REFERRER_POLICY: &str = "referrer_policy";
/// Meta key listing non-2xx statuses the callback wants to receive.
pub const META_HANDLE_HTTPSTATUS_LIST: &str = "handle_httpstatus_list";
/// Meta key letting every status through to the callback.
pub const META_HANDLE_HTTPSTATUS_ALL: &str = "handle_httpstatus_all";
/// Meta key listing the URLs a request was redirected from.
pub const META_REDIRECT_URLS: &str = "redirect_urls";

#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub meta: HashMap<String, Value>,
    pub priority: i32,
    /// Name of the spider callback that should parse the response.
    pub callback: Option<String>,
    /// Name of the spider errback that should handle failures.
    pub errback: Option<String>,
    pub flags: Vec<String>,
}

impl Request {
    /// Creates a `GET` request for `url`.
    pub fn new(url: Url) -> Self {
        Request {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            meta: HashMap::new(),
            priority: 0,
            callback: None,
            errback: None,
            flags: Vec::new(),
        }
    }

    /// Parses `url` and creates a `GET` request for it.
    pub fn get(url: &str) -> Result<Self, SpiderError> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn with_errback(mut self, errback: impl Into<String>) -> Self {
        self.errback = Some(errback.into());
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Adds a header, replacing any previous value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, SpiderError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SpiderError::GeneralError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SpiderError::GeneralError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.meta.insert(key.into(), value.into());
    }

    /// Inserts a meta value only when the key is absent.
    pub fn set_meta_default(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.meta.entry(key.into()).or_insert_with(|| value.into());
    }

    /// The link depth recorded in meta, if any.
    pub fn depth(&self) -> Option<u64> {
        self.meta.get(META_DEPTH).and_then(Value::as_u64)
    }

    pub fn is_start_request(&self) -> bool {
        self.meta
            .get(META_IS_START_REQUEST)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Returns a header value decoded lossily, so latin-1 bytes never fail.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    }

    /// Sets a header only when it is not already present.
    ///
    /// Returns `false` when `value` is not a valid header value.
    pub fn set_header_default(&mut self, name: HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.entry(name).or_insert(value);
                true
            }
            Err(_) => false,
        }
    }

    /// Length of the serialized URL.
    pub fn url_len(&self) -> usize {
        self.url.as_str().len()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.method, self.url)
    }
}
