//! # Spider Module
//!
//! Defines the core `Spider` trait implemented by user scraping logic.
//!
//! ## Overview
//!
//! The `Spider` trait is the primary interface for defining custom scraping logic.
//! It specifies how a crawl starts (via start URLs or start requests) and how
//! responses are turned into scraped items and further requests. Everything a
//! spider produces travels through the spider middleware chain before it
//! reaches the engine.
//!
//! ## Implementation
//!
//! Implementors must define:
//! - `name`: A unique name, used in logs
//! - `parse`: Logic for extracting data and discovering new URLs from responses
//! - `Item`: The type of data structure to store scraped information
//!
//! Optional hooks:
//! - `start_urls` / `start_requests`: The initial requests of the crawl
//! - `handle_error`: The errback, called when a request names one and the
//!   response fails spider input processing
//! - `handle_httpstatus_list`: Non-2xx statuses the spider wants to parse
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_chain::prelude::*;
//!
//! #[derive(Debug)]
//! struct Article {
//!     title: String,
//! }
//!
//! struct ArticleSpider;
//!
//! #[async_trait]
//! impl Spider for ArticleSpider {
//!     type Item = Article;
//!
//!     fn name(&self) -> &str {
//!         "articles"
//!     }
//!
//!     fn start_urls(&self) -> Vec<&'static str> {
//!         vec!["https://example.com/articles"]
//!     }
//!
//!     async fn parse(&self, response: &Response) -> Result<ParseOutput<Self::Item>, SpiderError> {
//!         let mut output = ParseOutput::new();
//!         output.add_item(Article { title: response.url.to_string() });
//!         output.add_request(Request::get("https://example.com/articles?page=2")?);
//!         Ok(output)
//!     }
//! }
//! ```

use crate::error::SpiderError;
use crate::item::{ParseOutput, ScrapedItem};
use crate::request::Request;
use crate::response::Response;

use async_trait::async_trait;
use url::Url;

/// Defines the contract for a web spider.
#[async_trait]
pub trait Spider: Send + Sync + 'static {
    /// The type of item that the spider scrapes.
    type Item: ScrapedItem;

    /// The spider's name.
    fn name(&self) -> &str;

    /// Returns the initial URLs to start crawling from.
    fn start_urls(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Generates the initial requests to start crawling.
    fn start_requests(&self) -> Result<Vec<Request>, SpiderError> {
        let urls: Result<Vec<Url>, url::ParseError> =
            self.start_urls().into_iter().map(Url::parse).collect();
        Ok(urls?.into_iter().map(Request::new).collect())
    }

    /// Non-2xx status codes this spider parses.
    ///
    /// `Some` replaces the `HTTPERROR_ALLOWED_CODES` setting for this spider.
    fn handle_httpstatus_list(&self) -> Option<Vec<u16>> {
        None
    }

    /// Parses a response and extracts scraped items and new requests.
    ///
    /// This is the entry point for every response. Spiders with several
    /// callbacks dispatch on `response.request.callback`, the name set with
    /// [`Request::with_callback`].
    async fn parse(&self, response: &Response) -> Result<ParseOutput<Self::Item>, SpiderError>;

    /// Handles a failure for a request that names an errback.
    ///
    /// Returning `Err` hands the failure to the middleware exception chain.
    async fn handle_error(
        &self,
        _response: &Response,
        error: SpiderError,
    ) -> Result<ParseOutput<Self::Item>, SpiderError> {
        Err(error)
    }
}
