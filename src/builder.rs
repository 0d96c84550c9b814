//! # Builder Module
//!
//! Provides the `ScraperBuilder`, a fluent API for constructing and configuring
//! `Scraper` instances.
//!
//! ## Overview
//!
//! The builder assembles a spider, its `Settings` and a `MiddlewareRegistry`
//! into a `Scraper`. It starts from the default settings and the built-in
//! middlewares, and lets callers override settings, register custom
//! middlewares under an identifier, or disable middlewares.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_chain::prelude::*;
//!
//! async fn setup_scraper() -> Result<(), SpiderError> {
//!     let scraper = ScraperBuilder::new(MySpider)
//!         .settings(Settings::from_json_file("settings.json")?)
//!         .add_middleware("tag_items", 500, TagItems)
//!         .disable_middleware("url_length")
//!         .scraper_workers(4)
//!         .build()?;
//!
//!     let result = scraper.scrape(response).await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::error::SpiderError;
use crate::middleware::{MiddlewareContext, MiddlewareRegistry, SpiderMiddleware};
use crate::scraper::{Scraper, SpiderMiddlewareManager};
use crate::settings::Settings;
use crate::spider::Spider;
use crate::stats::StatCollector;

pub struct ScraperBuilder<S: Spider> {
    spider: S,
    settings: Settings,
    registry: MiddlewareRegistry<S::Item>,
    /// Overrides applied on top of `settings.spider_middlewares`.
    middleware_overrides: Vec<(String, Option<i32>)>,
    stats: Option<Arc<StatCollector>>,
}

impl<S: Spider> ScraperBuilder<S> {
    /// Creates a new `ScraperBuilder` for a given spider with the default
    /// settings and the built-in middlewares.
    pub fn new(spider: S) -> Self {
        Self {
            spider,
            settings: Settings::default(),
            registry: MiddlewareRegistry::with_builtins(),
            middleware_overrides: Vec::new(),
            stats: None,
        }
    }

    /// Replaces the settings.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the number of concurrent scraping workers.
    pub fn scraper_workers(mut self, workers: usize) -> Self {
        self.settings.scraper_workers = workers;
        self
    }

    /// Sets the capacity of communication channels between components.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.settings.channel_capacity = capacity;
        self
    }

    /// Shares an existing `StatCollector` instead of creating a new one.
    pub fn stats(mut self, stats: Arc<StatCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Registers a middleware factory under `name`.
    ///
    /// The middleware only runs if `name` is enabled in the settings.
    pub fn register_middleware<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&MiddlewareContext<'_>) -> Result<Option<Arc<dyn SpiderMiddleware<S::Item>>>, SpiderError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(name, factory);
        self
    }

    /// Registers `middleware` under `name` and enables it at `order`.
    pub fn add_middleware<M>(mut self, name: &str, order: i32, middleware: M) -> Self
    where
        M: SpiderMiddleware<S::Item>,
    {
        self.registry.register_instance(name, Arc::new(middleware));
        self.middleware_overrides.push((name.to_string(), Some(order)));
        self
    }

    /// Disables the middleware registered under `name`.
    pub fn disable_middleware(mut self, name: &str) -> Self {
        self.middleware_overrides.push((name.to_string(), None));
        self
    }

    /// Builds the `Scraper`, validating the settings and instantiating every
    /// enabled middleware.
    pub fn build(self) -> Result<Scraper<S>, SpiderError> {
        let mut settings = self.settings;
        settings.spider_middlewares.extend(self.middleware_overrides);
        settings.validate()?;

        let stats = self.stats.unwrap_or_else(|| Arc::new(StatCollector::new()));
        let spider = Arc::new(self.spider);
        let manager = {
            let ctx = MiddlewareContext {
                settings: &settings,
                stats: Arc::clone(&stats),
                spider_name: spider.name(),
                spider_httpstatus_list: spider.handle_httpstatus_list(),
            };
            SpiderMiddlewareManager::from_settings(&self.registry, &ctx)?
        };

        Ok(Scraper::new(spider, manager, settings, stats))
    }
}
