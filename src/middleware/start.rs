//! Marks requests coming from the spider's start output.

use crate::item::{OutputStream, ScrapedItem};
use crate::middleware::{OutputFilter, SpiderMiddleware, filter_outputs};
use crate::request::{META_IS_START_REQUEST, Request};
use crate::response::Response;

/// Sets the `is_start_request` meta on every start request that does not
/// already carry it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StartSpiderMiddleware;

impl OutputFilter for StartSpiderMiddleware {
    fn process_request(&self, mut request: Request, response: Option<&Response>) -> Option<Request> {
        if response.is_none() {
            request.set_meta_default(META_IS_START_REQUEST, true);
        }
        Some(request)
    }
}

impl<I: ScrapedItem> SpiderMiddleware<I> for StartSpiderMiddleware {
    fn name(&self) -> &str {
        "StartSpiderMiddleware"
    }

    fn process_start<'a>(&'a self, start: OutputStream<'a, I>) -> OutputStream<'a, I> {
        filter_outputs(self, None, start)
    }
}
