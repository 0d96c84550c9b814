//! The core `Scraper` implementation.
//!
//! A `Scraper` ties a spider to its spider middleware chain. For each
//! downloaded response it runs the input hooks, calls the spider callback
//! (or the errback when input processing fails and the request names one),
//! and runs the produced requests and items through the output chain.
//! Failures are routed through the exception chain; those no middleware
//! handles are logged and counted as spider errors. Responses, items and
//! errors also feed the scraper's `CloseSpider` thresholds.

use futures_util::future;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, trace};

use crate::close_spider::{CloseReason, CloseSpider};
use crate::error::SpiderError;
use crate::formatter;
use crate::item::{OutputStream, SpiderOutput};
use crate::request::Request;
use crate::response::Response;
use crate::scraper::SpiderMiddlewareManager;
use crate::settings::Settings;
use crate::spider::Spider;
use crate::stats::StatCollector;

/// Everything that came out of scraping one response.
#[derive(Debug)]
pub struct ScrapeResult<I> {
    pub requests: Vec<Request>,
    pub items: Vec<I>,
    /// Errors no middleware handled.
    pub errors: Vec<SpiderError>,
}

impl<I> Default for ScrapeResult<I> {
    fn default() -> Self {
        ScrapeResult {
            requests: Vec::new(),
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Runs responses through a spider and its middleware chain.
pub struct Scraper<S: Spider> {
    spider: Arc<S>,
    manager: SpiderMiddlewareManager<S::Item>,
    settings: Settings,
    stats: Arc<StatCollector>,
    close_spider: CloseSpider,
}

impl<S: Spider> Scraper<S> {
    pub(crate) fn new(
        spider: Arc<S>,
        manager: SpiderMiddlewareManager<S::Item>,
        settings: Settings,
        stats: Arc<StatCollector>,
    ) -> Self {
        let close_spider = CloseSpider::from_settings(&settings);
        Scraper {
            spider,
            manager,
            settings,
            stats,
            close_spider,
        }
    }

    pub fn spider(&self) -> &Arc<S> {
        &self.spider
    }

    pub fn middleware_manager(&self) -> &SpiderMiddlewareManager<S::Item> {
        &self.manager
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns a cloned Arc to the `StatCollector` used by this scraper.
    pub fn get_stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    pub fn close_spider(&self) -> &CloseSpider {
        &self.close_spider
    }

    /// The reason the scraping stage was closed, if a threshold was reached.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_spider.reason()
    }

    /// The spider's start requests, run through the start chain.
    ///
    /// A failure to build the start requests is yielded as the only element.
    pub fn process_start(&self) -> OutputStream<'_, S::Item> {
        let start = match self.spider.start_requests() {
            Ok(requests) => {
                trace!("Spider '{}' produced {} start requests", self.spider.name(), requests.len());
                stream::iter(requests.into_iter().map(|r| Ok(SpiderOutput::Request(r)))).boxed()
            }
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        };
        self.manager.process_start(start)
    }

    /// Scrapes one response, returning its output stream.
    ///
    /// Unhandled failures are yielded as `Err` elements; nothing is logged
    /// or counted. Use [`Scraper::scrape`] for the logged variant.
    pub fn scrape_response(&self, response: Response) -> OutputStream<'_, S::Item> {
        self.outputs_for(Arc::new(response))
    }

    /// Scrapes one response and collects its output.
    pub async fn scrape(&self, response: Response) -> ScrapeResult<S::Item> {
        debug!("{}", formatter::crawled(&response.request, &response));
        self.stats.increment_responses_scraped();
        self.close_spider.response_received();

        let response = Arc::new(response);
        let mut result = ScrapeResult::default();
        let mut outputs = self.outputs_for(Arc::clone(&response));
        while let Some(output) = outputs.next().await {
            match output {
                Ok(SpiderOutput::Request(request)) => {
                    trace!("Spider produced {} from {}", request, response);
                    self.stats.increment_requests_produced();
                    result.requests.push(request);
                }
                Ok(SpiderOutput::Item(item)) => {
                    debug!("{}", formatter::scraped(&item, &response));
                    self.stats.increment_items_scraped();
                    self.close_spider.item_scraped();
                    result.items.push(item);
                }
                Err(e) => {
                    error!("{}", formatter::spider_error(&e, &response.request));
                    self.stats.record_spider_error(&e);
                    self.close_spider.spider_error();
                    result.errors.push(e);
                }
            }
        }
        result
    }

    fn outputs_for(&self, response: Arc<Response>) -> OutputStream<'_, S::Item> {
        stream::once(async move {
            let input = self.manager.process_spider_input(&response).await;
            let output = match input {
                Ok(()) => self.spider.parse(&response).await,
                Err(e) if response.request.errback.is_some() => {
                    debug!("Calling errback for {}: {}", response, e);
                    self.spider.handle_error(&response, e).await
                }
                Err(e) => Err(e),
            };
            let chain = match output {
                Ok(output) => Ok(self.manager.scrape_output(response, output.into_stream())),
                Err(e) => self.manager.process_spider_exception(response, e, 0),
            };
            chain.unwrap_or_else(|e| stream::once(future::ready(Err(e))).boxed())
        })
        .flatten()
        .boxed()
    }
}
