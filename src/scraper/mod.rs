//! # Scraper Module
//!
//! Implements the scraping stage that sits between the engine and a spider.
//!
//! ## Overview
//!
//! The scraper receives downloaded responses, runs them through the spider
//! middleware chain and the spider, and hands the resulting requests and items
//! back to the engine.
//!
//! ## Key Components
//!
//! - **Scraper**: Ties a spider to its middleware chain and collects output
//! - **SpiderMiddlewareManager**: Builds the input, output, exception and
//!   start chains from the enabled middlewares
//! - **Start Task**: Sends the processed start requests to the engine
//! - **Scraper Task**: A coordinator and a pool of workers scraping responses
//!   concurrently
//!
//! ## Architecture
//!
//! Tasks communicate over bounded `kanal` channels: responses come in,
//! requests and items go out. `ScraperState` counters make it observable when
//! every response has been scraped and every output has been sent.

mod core;
mod middleware_manager;
mod task;

pub use self::core::{ScrapeResult, Scraper};
pub use middleware_manager::SpiderMiddlewareManager;
pub use task::{spawn_scraper_task, spawn_start_task};
