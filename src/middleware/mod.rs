//! # Spider Middleware Module
//!
//! Defines the `SpiderMiddleware` extension point and the built-in middlewares.
//!
//! ## Overview
//!
//! Spider middlewares hook into the path between the engine and the spider:
//!
//! - **Input**: `process_spider_input` sees every response before the spider
//!   callback, in ascending order. An error stops the remaining input hooks
//!   and is sent to the request errback or to the exception chain.
//! - **Output**: `process_spider_output` wraps the stream of requests and
//!   items produced by the callback, in descending order, so the middleware
//!   closest to the spider sees the output first.
//! - **Exceptions**: `process_spider_exception` may resolve a failure with
//!   replacement output, which continues through the output hooks of the
//!   middlewares closer to the engine.
//! - **Start**: `process_start` wraps the spider's start output, in
//!   descending order.
//!
//! Every hook defaults to a pass-through, so a middleware only implements
//! the hooks it needs.
//!
//! ## Built-in Middlewares
//!
//! | Identifier   | Order | Type                    |
//! |--------------|-------|-------------------------|
//! | `start`      | 25    | `StartSpiderMiddleware` |
//! | `http_error` | 50    | `HttpErrorMiddleware`   |
//! | `referer`    | 700   | `RefererMiddleware`     |
//! | `url_length` | 800   | `UrlLengthMiddleware`   |
//! | `depth`      | 900   | `DepthMiddleware`       |
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_chain::prelude::*;
//!
//! struct TagItems;
//!
//! impl OutputFilter for TagItems {
//!     fn process_request(&self, request: Request, _response: Option<&Response>) -> Option<Request> {
//!         Some(request.with_flag("tagged"))
//!     }
//! }
//!
//! impl<I: ScrapedItem> SpiderMiddleware<I> for TagItems {
//!     fn name(&self) -> &str {
//!         "tag_items"
//!     }
//!
//!     fn process_spider_output<'a>(
//!         &'a self,
//!         response: Arc<Response>,
//!         result: OutputStream<'a, I>,
//!     ) -> OutputStream<'a, I> {
//!         filter_outputs(self, Some(response), result)
//!     }
//! }
//! ```

pub mod depth;
pub mod http_error;
pub mod referer;
pub mod referrer_policy;
pub mod registry;
pub mod start;
pub mod url_length;

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::StreamExt;
use std::sync::Arc;

use crate::error::SpiderError;
use crate::item::{OutputStream, ScrapedItem, SpiderOutput};
use crate::request::Request;
use crate::response::Response;

pub use depth::DepthMiddleware;
pub use http_error::HttpErrorMiddleware;
pub use referer::RefererMiddleware;
pub use referrer_policy::ReferrerPolicy;
pub use registry::{MiddlewareContext, MiddlewareFactory, MiddlewareRegistry};
pub use start::StartSpiderMiddleware;
pub use url_length::UrlLengthMiddleware;

/// A hook around spider input and output processing.
#[async_trait]
pub trait SpiderMiddleware<I: ScrapedItem>: Send + Sync + 'static {
    /// The middleware's name, used in logs.
    fn name(&self) -> &str;

    /// Inspects a response before the spider callback runs.
    async fn process_spider_input(&self, _response: &Response) -> Result<(), SpiderError> {
        Ok(())
    }

    /// Wraps the output produced for `response`.
    fn process_spider_output<'a>(
        &'a self,
        _response: Arc<Response>,
        result: OutputStream<'a, I>,
    ) -> OutputStream<'a, I> {
        result
    }

    /// Handles a failure raised for `response`.
    ///
    /// `None` declines the failure; `Some` resolves it with replacement output.
    fn process_spider_exception<'a>(
        &'a self,
        _response: Arc<Response>,
        _error: &SpiderError,
    ) -> Option<OutputStream<'a, I>> {
        None
    }

    /// Wraps the spider's start output.
    fn process_start<'a>(&'a self, start: OutputStream<'a, I>) -> OutputStream<'a, I> {
        start
    }
}

/// Per-output decisions for middlewares that filter or annotate requests
/// and items one at a time.
///
/// `response` is `None` for start output. Returning `None` drops the output.
pub trait OutputFilter: Send + Sync {
    fn process_request(&self, request: Request, _response: Option<&Response>) -> Option<Request> {
        Some(request)
    }

    fn process_item<I: ScrapedItem>(&self, item: I, _response: Option<&Response>) -> Option<I> {
        Some(item)
    }
}

/// Applies an [`OutputFilter`] to every element of `stream`.
///
/// Errors pass through untouched.
pub fn filter_outputs<'a, I, F>(
    filter: &'a F,
    response: Option<Arc<Response>>,
    stream: OutputStream<'a, I>,
) -> OutputStream<'a, I>
where
    I: ScrapedItem,
    F: OutputFilter,
{
    stream
        .filter_map(move |output| {
            let response = response.as_deref();
            let kept = match output {
                Ok(SpiderOutput::Request(request)) => filter
                    .process_request(request, response)
                    .map(|request| Ok(SpiderOutput::Request(request))),
                Ok(SpiderOutput::Item(item)) => filter
                    .process_item(item, response)
                    .map(|item| Ok(SpiderOutput::Item(item))),
                Err(e) => Some(Err(e)),
            };
            future::ready(kept)
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    struct DropOddPriority;

    impl OutputFilter for DropOddPriority {
        fn process_request(&self, request: Request, _response: Option<&Response>) -> Option<Request> {
            (request.priority % 2 == 0).then_some(request)
        }
    }

    #[tokio::test]
    async fn test_filter_outputs_drops_and_keeps_errors() {
        let outputs: Vec<Result<SpiderOutput<u32>, SpiderError>> = vec![
            Ok(SpiderOutput::Request(Request::get("http://a.example").unwrap().with_priority(1))),
            Ok(SpiderOutput::Request(Request::get("http://b.example").unwrap().with_priority(2))),
            Ok(SpiderOutput::Item(7)),
            Err(SpiderError::GeneralError("boom".into())),
        ];
        let filtered: Vec<_> = filter_outputs(&DropOddPriority, None, stream::iter(outputs).boxed())
            .collect()
            .await;

        assert_eq!(filtered.len(), 3);
        assert_eq!(
            filtered[0].as_ref().unwrap().as_request().unwrap().url.as_str(),
            "http://b.example/"
        );
        assert_eq!(filtered[1].as_ref().unwrap().as_item(), Some(&7));
        assert!(filtered[2].is_err());
    }
}
