//! Maps middleware identifiers to the factories that build them.
//!
//! Settings only carry identifiers and orders; the registry turns an
//! identifier into a middleware instance. A factory returning `Ok(None)`
//! marks the middleware as not configured, and the manager skips it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SpiderError;
use crate::item::ScrapedItem;
use crate::middleware::{
    DepthMiddleware, HttpErrorMiddleware, RefererMiddleware, SpiderMiddleware,
    StartSpiderMiddleware, UrlLengthMiddleware,
};
use crate::settings::{
    DEPTH_MIDDLEWARE, HTTP_ERROR_MIDDLEWARE, REFERER_MIDDLEWARE, START_MIDDLEWARE,
    Settings, URL_LENGTH_MIDDLEWARE,
};
use crate::stats::StatCollector;

/// What a factory can read while building a middleware.
pub struct MiddlewareContext<'a> {
    pub settings: &'a Settings,
    pub stats: Arc<StatCollector>,
    pub spider_name: &'a str,
    /// The spider's own allow list of non-2xx statuses.
    pub spider_httpstatus_list: Option<Vec<u16>>,
}

pub type MiddlewareFactory<I> = Arc<
    dyn Fn(&MiddlewareContext<'_>) -> Result<Option<Arc<dyn SpiderMiddleware<I>>>, SpiderError>
        + Send
        + Sync,
>;

pub struct MiddlewareRegistry<I: ScrapedItem> {
    factories: HashMap<String, MiddlewareFactory<I>>,
}

impl<I: ScrapedItem> Default for MiddlewareRegistry<I> {
    fn default() -> Self {
        MiddlewareRegistry {
            factories: HashMap::new(),
        }
    }
}

impl<I: ScrapedItem> MiddlewareRegistry<I> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the five built-in middlewares.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(START_MIDDLEWARE, |_ctx| {
            Ok(Some(Arc::new(StartSpiderMiddleware) as Arc<dyn SpiderMiddleware<I>>))
        });
        registry.register(HTTP_ERROR_MIDDLEWARE, |ctx| {
            Ok(Some(
                Arc::new(HttpErrorMiddleware::from_context(ctx)) as Arc<dyn SpiderMiddleware<I>>
            ))
        });
        registry.register(REFERER_MIDDLEWARE, |ctx| {
            Ok(RefererMiddleware::from_context(ctx)?
                .map(|mw| Arc::new(mw) as Arc<dyn SpiderMiddleware<I>>))
        });
        registry.register(URL_LENGTH_MIDDLEWARE, |ctx| {
            Ok(UrlLengthMiddleware::from_context(ctx)
                .map(|mw| Arc::new(mw) as Arc<dyn SpiderMiddleware<I>>))
        });
        registry.register(DEPTH_MIDDLEWARE, |ctx| {
            Ok(Some(
                Arc::new(DepthMiddleware::from_context(ctx)) as Arc<dyn SpiderMiddleware<I>>
            ))
        });
        registry
    }

    /// Registers a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&MiddlewareContext<'_>) -> Result<Option<Arc<dyn SpiderMiddleware<I>>>, SpiderError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Registers an already built middleware under `name`.
    pub fn register_instance(&mut self, name: &str, middleware: Arc<dyn SpiderMiddleware<I>>) {
        self.register(name, move |_ctx| Ok(Some(Arc::clone(&middleware))));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds the middleware registered under `name`.
    pub fn build(
        &self,
        name: &str,
        ctx: &MiddlewareContext<'_>,
    ) -> Result<Option<Arc<dyn SpiderMiddleware<I>>>, SpiderError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            SpiderError::ConfigurationError(format!(
                "No spider middleware registered under '{}'.",
                name
            ))
        })?;
        factory(ctx)
    }
}
