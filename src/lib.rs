//! # spider-chain
//!
//! Spider middleware chain of the `spider-lib` web scraping framework.
//!
//! Provides the scraping stage that sits between the engine and a spider:
//! the `Spider` trait, the `SpiderMiddleware` extension point, the `Scraper`
//! that runs responses through the middleware chain, and five built-in
//! middlewares (start request marking, HTTP status filtering, `Referer`
//! population, URL length filtering and depth tracking). `CloseSpider`
//! thresholds stop the scraping stage after enough items, pages, errors or
//! time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_chain::prelude::*;
//!
//! #[derive(Debug)]
//! struct MyItem {
//!     title: String,
//! }
//!
//! struct MySpider;
//!
//! #[async_trait]
//! impl Spider for MySpider {
//!     type Item = MyItem;
//!     fn name(&self) -> &str { "my_spider" }
//!     fn start_urls(&self) -> Vec<&'static str> { vec!["https://example.com"] }
//!     async fn parse(&self, response: &Response) -> Result<ParseOutput<Self::Item>, SpiderError> {
//!         todo!()
//!     }
//! }
//!
//! async fn scrape(response: Response) -> Result<(), SpiderError> {
//!     let scraper = ScraperBuilder::new(MySpider).build()?;
//!     let result = scraper.scrape(response).await;
//!     println!("{} items, {} requests", result.items.len(), result.requests.len());
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod close_spider;
pub mod error;
pub mod formatter;
pub mod item;
pub mod middleware;
pub mod prelude;
pub mod request;
pub mod response;
pub mod scraper;
pub mod settings;
pub mod spider;
pub mod state;
pub mod stats;

pub use builder::ScraperBuilder;
pub use close_spider::{CloseReason, CloseSpider};
pub use error::SpiderError;
pub use item::{OutputStream, ParseOutput, ScrapedItem, SpiderOutput};
pub use middleware::{MiddlewareRegistry, SpiderMiddleware};
pub use request::Request;
pub use response::Response;
pub use scraper::{ScrapeResult, Scraper, SpiderMiddlewareManager};
pub use settings::Settings;
pub use spider::Spider;
pub use state::ScraperState;
pub use stats::StatCollector;

pub use async_trait::async_trait;
pub use tokio;
