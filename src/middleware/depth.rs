//! Tracks link depth, adjusts priority by depth, and enforces `DEPTH_LIMIT`.
//!
//! Start requests carry no parent response and keep whatever depth they were
//! given. A request produced from a response of depth `d` gets depth `d + 1`;
//! a response without a recorded depth counts as depth 0.

use std::sync::Arc;
use tracing::debug;

use crate::item::{OutputStream, ScrapedItem};
use crate::middleware::{MiddlewareContext, OutputFilter, SpiderMiddleware, filter_outputs};
use crate::request::{META_DEPTH, Request};
use crate::response::Response;
use crate::stats::StatCollector;

pub struct DepthMiddleware {
    max_depth: u64,
    verbose_stats: bool,
    priority: i32,
    stats: Arc<StatCollector>,
}

impl DepthMiddleware {
    pub fn new(max_depth: u64, verbose_stats: bool, priority: i32, stats: Arc<StatCollector>) -> Self {
        DepthMiddleware {
            max_depth,
            verbose_stats,
            priority,
            stats,
        }
    }

    pub fn from_context(ctx: &MiddlewareContext<'_>) -> Self {
        Self::new(
            ctx.settings.depth_limit,
            ctx.settings.depth_stats_verbose,
            ctx.settings.depth_priority,
            Arc::clone(&ctx.stats),
        )
    }
}

impl OutputFilter for DepthMiddleware {
    fn process_request(&self, mut request: Request, response: Option<&Response>) -> Option<Request> {
        let Some(response) = response else {
            return Some(request);
        };

        let depth = response.request.depth().unwrap_or(0).saturating_add(1);
        request.set_meta(META_DEPTH, depth);
        if self.priority != 0 {
            let step = i32::try_from(depth).unwrap_or(i32::MAX);
            request.priority = request
                .priority
                .saturating_sub(step.saturating_mul(self.priority));
        }

        if self.max_depth != 0 && depth > self.max_depth {
            debug!("Ignoring link (depth > {}): {}", self.max_depth, request.url);
            return None;
        }

        if self.verbose_stats {
            self.stats
                .inc_value(&format!("request_depth_count/{}", depth), 1);
        }
        self.stats
            .max_value("request_depth_max", i64::try_from(depth).unwrap_or(i64::MAX));
        Some(request)
    }
}

impl<I: ScrapedItem> SpiderMiddleware<I> for DepthMiddleware {
    fn name(&self) -> &str {
        "DepthMiddleware"
    }

    fn process_spider_output<'a>(
        &'a self,
        response: Arc<Response>,
        result: OutputStream<'a, I>,
    ) -> OutputStream<'a, I> {
        if self.verbose_stats
            && response.request.depth().is_none()
            && response.mark_depth_counted()
        {
            self.stats.inc_value("request_depth_count/0", 1);
        }
        filter_outputs(self, Some(response), result)
    }
}
