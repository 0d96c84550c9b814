//! Drops requests whose URL exceeds `URLLENGTH_LIMIT`.

use std::sync::Arc;
use tracing::info;

use crate::item::{OutputStream, ScrapedItem};
use crate::middleware::{MiddlewareContext, OutputFilter, SpiderMiddleware, filter_outputs};
use crate::request::Request;
use crate::response::Response;
use crate::stats::StatCollector;

pub struct UrlLengthMiddleware {
    max_length: usize,
    stats: Arc<StatCollector>,
}

impl UrlLengthMiddleware {
    pub fn new(max_length: usize, stats: Arc<StatCollector>) -> Self {
        UrlLengthMiddleware { max_length, stats }
    }

    /// Returns `None` when `URLLENGTH_LIMIT` is 0.
    pub fn from_context(ctx: &MiddlewareContext<'_>) -> Option<Self> {
        match ctx.settings.urllength_limit {
            0 => None,
            limit => Some(Self::new(limit, Arc::clone(&ctx.stats))),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl OutputFilter for UrlLengthMiddleware {
    fn process_request(&self, request: Request, _response: Option<&Response>) -> Option<Request> {
        if request.url_len() <= self.max_length {
            return Some(request);
        }
        info!(
            "Ignoring link (url length > {}): {}",
            self.max_length, request.url
        );
        self.stats.inc_value("urllength/request_ignored_count", 1);
        None
    }
}

impl<I: ScrapedItem> SpiderMiddleware<I> for UrlLengthMiddleware {
    fn name(&self) -> &str {
        "UrlLengthMiddleware"
    }

    fn process_spider_output<'a>(
        &'a self,
        response: Arc<Response>,
        result: OutputStream<'a, I>,
    ) -> OutputStream<'a, I> {
        filter_outputs(self, Some(response), result)
    }

    fn process_start<'a>(&'a self, start: OutputStream<'a, I>) -> OutputStream<'a, I> {
        filter_outputs(self, None, start)
    }
}
