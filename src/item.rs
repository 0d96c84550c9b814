//! Spider output types: scraped items, requests, and the streams that carry them.

use futures_util::stream::{self, BoxStream, StreamExt};
use std::fmt::Debug;

use crate::error::SpiderError;
use crate::request::Request;

/// Marker trait for the items a spider produces.
pub trait ScrapedItem: Debug + Send + Sync + 'static {}

impl<T: Debug + Send + Sync + 'static> ScrapedItem for T {}

/// A single element of spider output.
#[derive(Debug)]
pub enum SpiderOutput<I> {
    Request(Request),
    Item(I),
}

impl<I> SpiderOutput<I> {
    pub fn as_request(&self) -> Option<&Request> {
        match self {
            SpiderOutput::Request(request) => Some(request),
            SpiderOutput::Item(_) => None,
        }
    }

    pub fn as_item(&self) -> Option<&I> {
        match self {
            SpiderOutput::Item(item) => Some(item),
            SpiderOutput::Request(_) => None,
        }
    }
}

/// Asynchronous stream of spider output flowing through the middleware chain.
///
/// An `Err` element is a failure raised while producing output; the chain
/// routes it to the exception hooks of the middlewares that come after the
/// producer.
pub type OutputStream<'a, I> = BoxStream<'a, Result<SpiderOutput<I>, SpiderError>>;

/// Returns an output stream yielding nothing.
pub fn empty_output<'a, I: ScrapedItem>() -> OutputStream<'a, I> {
    stream::empty().boxed()
}

/// Ordered output of one spider callback.
#[derive(Debug)]
pub struct ParseOutput<I> {
    outputs: Vec<SpiderOutput<I>>,
}

impl<I> Default for ParseOutput<I> {
    fn default() -> Self {
        ParseOutput {
            outputs: Vec::new(),
        }
    }
}

impl<I: ScrapedItem> ParseOutput<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, item: I) {
        self.outputs.push(SpiderOutput::Item(item));
    }

    pub fn add_request(&mut self, request: Request) {
        self.outputs.push(SpiderOutput::Request(request));
    }

    pub fn add_items(&mut self, items: impl IntoIterator<Item = I>) {
        self.outputs
            .extend(items.into_iter().map(SpiderOutput::Item));
    }

    pub fn add_requests(&mut self, requests: impl IntoIterator<Item = Request>) {
        self.outputs
            .extend(requests.into_iter().map(SpiderOutput::Request));
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn into_stream<'a>(self) -> OutputStream<'a, I> {
        stream::iter(self.outputs.into_iter().map(Ok)).boxed()
    }
}

impl<I: ScrapedItem> From<Vec<SpiderOutput<I>>> for ParseOutput<I> {
    fn from(outputs: Vec<SpiderOutput<I>>) -> Self {
        ParseOutput { outputs }
    }
}
