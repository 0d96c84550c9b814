//! Spider middleware manager.
//!
//! Holds the enabled middlewares in ascending order and assembles the input,
//! output, exception and start chains around them. Input hooks run in
//! ascending order; output, exception and start hooks run in descending
//! order, so exception index 0 is the middleware closest to the spider.
//!
//! Every stream entering an output hook is guarded. When a guarded stream
//! yields an error, it ends, and the error is offered to the exception hooks
//! starting at the guard's index. Replacement output from a hook runs through
//! the output hooks after that middleware and is appended after the main
//! output. An error no hook handles stops the chain and is yielded once, as
//! its last element.

use futures_util::future;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::error::SpiderError;
use crate::item::{OutputStream, ScrapedItem};
use crate::middleware::{MiddlewareContext, MiddlewareRegistry, SpiderMiddleware};
use crate::response::Response;

/// The first unhandled error of one scrape.
type FailureSlot = Arc<Mutex<Option<SpiderError>>>;
/// Recovered output waiting to run after the main output of one chain.
type RecoveredQueue<'a, I> = Arc<Mutex<VecDeque<OutputStream<'a, I>>>>;

pub struct SpiderMiddlewareManager<I: ScrapedItem> {
    middlewares: Vec<(String, Arc<dyn SpiderMiddleware<I>>)>,
}

impl<I: ScrapedItem> SpiderMiddlewareManager<I> {
    /// Creates a manager from middlewares already sorted by ascending order.
    pub fn new(middlewares: Vec<(String, Arc<dyn SpiderMiddleware<I>>)>) -> Self {
        Self { middlewares }
    }

    /// Builds every middleware enabled in the settings, skipping the ones
    /// whose factory reports them as not configured.
    pub fn from_settings(
        registry: &MiddlewareRegistry<I>,
        ctx: &MiddlewareContext<'_>,
    ) -> Result<Self, SpiderError> {
        let mut middlewares = Vec::new();
        for (name, order) in ctx.settings.middleware_order() {
            match registry.build(&name, ctx)? {
                Some(middleware) => {
                    trace!("Built spider middleware '{}' (order {})", name, order);
                    middlewares.push((name, middleware));
                }
                None => debug!("Spider middleware '{}' is not configured, skipping", name),
            }
        }

        let manager = Self::new(middlewares);
        info!(
            "Enabled spider middlewares for '{}': {:?}",
            ctx.spider_name,
            manager.names()
        );
        Ok(manager)
    }

    /// Identifiers of the enabled middlewares, in ascending order.
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs the input hooks in ascending order. The first error stops the
    /// remaining hooks.
    pub async fn process_spider_input(&self, response: &Response) -> Result<(), SpiderError> {
        for (name, middleware) in &self.middlewares {
            if let Err(e) = middleware.process_spider_input(response).await {
                debug!(
                    "Spider middleware '{}' rejected {}: {}",
                    name, response, e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Runs callback output through the whole output chain.
    pub fn scrape_output<'a>(
        &'a self,
        response: Arc<Response>,
        result: OutputStream<'a, I>,
    ) -> OutputStream<'a, I> {
        let failure = FailureSlot::default();
        let chain = self.output_from(response, result, 0, &failure);
        Self::surface_failure(chain, failure)
    }

    /// Offers `error` to the exception hooks starting at index `start`.
    ///
    /// Returns the recovered output, already run through the rest of the
    /// output chain, or gives `error` back when every hook declines it.
    pub fn process_spider_exception<'a>(
        &'a self,
        response: Arc<Response>,
        error: SpiderError,
        start: usize,
    ) -> Result<OutputStream<'a, I>, SpiderError> {
        let failure = FailureSlot::default();
        match self.exception_chain(response, &error, start, &failure) {
            Some(chain) => Ok(Self::surface_failure(chain, failure)),
            None => Err(error),
        }
    }

    /// Runs start output through the start hooks in descending order.
    pub fn process_start<'a>(&'a self, start: OutputStream<'a, I>) -> OutputStream<'a, I> {
        self.middlewares
            .iter()
            .rev()
            .fold(start, |stream, (_, middleware)| middleware.process_start(stream))
    }

    fn exception_chain<'a>(
        &'a self,
        response: Arc<Response>,
        error: &SpiderError,
        start: usize,
        failure: &FailureSlot,
    ) -> Option<OutputStream<'a, I>> {
        for (index, (name, middleware)) in self.middlewares.iter().rev().enumerate().skip(start) {
            if let Some(result) = middleware.process_spider_exception(Arc::clone(&response), error)
            {
                debug!(
                    "Spider middleware '{}' recovered from {} for {}",
                    name,
                    error.kind(),
                    response
                );
                return Some(self.output_from(response, result, index + 1, failure));
            }
        }
        None
    }

    /// Runs `result` through the output hooks from index `start` on.
    fn output_from<'a>(
        &'a self,
        response: Arc<Response>,
        result: OutputStream<'a, I>,
        start: usize,
        failure: &FailureSlot,
    ) -> OutputStream<'a, I> {
        let recovered: RecoveredQueue<'a, I> = Arc::default();
        let mut stream = result;
        for (index, (_, middleware)) in self.middlewares.iter().rev().enumerate().skip(start) {
            stream = self.guard(Arc::clone(&response), stream, index, &recovered, failure);
            stream = middleware.process_spider_output(Arc::clone(&response), stream);
        }
        let main = self.guard(response, stream, self.middlewares.len(), &recovered, failure);
        main.chain(Self::drain(recovered, Arc::clone(failure)))
            .boxed()
    }

    /// Ends `stream` at its first error and routes the error to the
    /// exception hooks from `index` on.
    fn guard<'a>(
        &'a self,
        response: Arc<Response>,
        stream: OutputStream<'a, I>,
        index: usize,
        recovered: &RecoveredQueue<'a, I>,
        failure: &FailureSlot,
    ) -> OutputStream<'a, I> {
        let recovered = Arc::clone(recovered);
        let failure = Arc::clone(failure);
        stream::unfold(stream, move |mut inner| {
            let response = Arc::clone(&response);
            let recovered = Arc::clone(&recovered);
            let failure = Arc::clone(&failure);
            async move {
                if failure.lock().is_some() {
                    return None;
                }
                match inner.next().await? {
                    Ok(output) => Some((Ok(output), inner)),
                    Err(error) => {
                        match self.exception_chain(response, &error, index, &failure) {
                            Some(chain) => recovered.lock().push_back(chain),
                            None => {
                                failure.lock().get_or_insert(error);
                            }
                        }
                        None
                    }
                }
            }
        })
        .boxed()
    }

    fn drain<'a>(recovered: RecoveredQueue<'a, I>, failure: FailureSlot) -> OutputStream<'a, I> {
        stream::unfold((recovered, failure), |(recovered, failure)| async move {
            if failure.lock().is_some() {
                return None;
            }
            let next = recovered.lock().pop_front();
            next.map(|chain| (chain, (recovered, failure)))
        })
        .flatten()
        .boxed()
    }

    fn surface_failure<'a>(chain: OutputStream<'a, I>, failure: FailureSlot) -> OutputStream<'a, I> {
        let last = stream::once(async move {
            let error = failure.lock().take();
            error.map(Err)
        })
        .filter_map(future::ready);
        chain.chain(last).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{SpiderOutput, empty_output};
    use crate::request::Request;
    use crate::settings::Settings;
    use crate::stats::StatCollector;
    use async_trait::async_trait;

    type Out = Result<SpiderOutput<String>, SpiderError>;

    fn item(value: &str) -> Out {
        Ok(SpiderOutput::Item(value.to_string()))
    }

    fn boom(message: &str) -> Out {
        Err(SpiderError::GeneralError(message.to_string()))
    }

    fn response() -> Arc<Response> {
        Arc::new(Response::new(Request::get("http://example.com/").unwrap()))
    }

    fn items(outputs: &[Out]) -> Vec<String> {
        outputs
            .iter()
            .filter_map(|o| o.as_ref().ok().and_then(|o| o.as_item().cloned()))
            .collect()
    }

    /// Appends its tag to every item it sees, and records the hooks it ran.
    struct Tagger {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        reject_input: bool,
        recover: Option<Vec<&'static str>>,
    }

    impl Tagger {
        fn new(tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Tagger {
                tag,
                log: Arc::clone(log),
                reject_input: false,
                recover: None,
            }
        }
    }

    #[async_trait]
    impl SpiderMiddleware<String> for Tagger {
        fn name(&self) -> &str {
            self.tag
        }

        async fn process_spider_input(&self, _response: &Response) -> Result<(), SpiderError> {
            self.log.lock().push(format!("input:{}", self.tag));
            if self.reject_input {
                return Err(SpiderError::GeneralError(format!("rejected by {}", self.tag)));
            }
            Ok(())
        }

        fn process_spider_output<'a>(
            &'a self,
            _response: Arc<Response>,
            result: OutputStream<'a, String>,
        ) -> OutputStream<'a, String> {
            result
                .map(move |output| match output {
                    Ok(SpiderOutput::Item(item)) => {
                        Ok(SpiderOutput::Item(format!("{}{}", item, self.tag)))
                    }
                    other => other,
                })
                .boxed()
        }

        fn process_spider_exception<'a>(
            &'a self,
            _response: Arc<Response>,
            error: &SpiderError,
        ) -> Option<OutputStream<'a, String>> {
            self.log.lock().push(format!("exception:{}:{}", self.tag, error));
            let replacement = self.recover.clone()?;
            let outputs: Vec<Out> = replacement.into_iter().map(item).collect();
            Some(stream::iter(outputs).boxed())
        }

        fn process_start<'a>(&'a self, start: OutputStream<'a, String>) -> OutputStream<'a, String> {
            self.log.lock().push(format!("start:{}", self.tag));
            start
        }
    }

    /// Fails while iterating the output it wraps.
    struct FailingOutput;

    impl SpiderMiddleware<String> for FailingOutput {
        fn name(&self) -> &str {
            "failing"
        }

        fn process_spider_output<'a>(
            &'a self,
            _response: Arc<Response>,
            result: OutputStream<'a, String>,
        ) -> OutputStream<'a, String> {
            result
                .take(1)
                .chain(stream::iter(vec![boom("output failed")]))
                .boxed()
        }
    }

    fn manager(middlewares: Vec<Arc<dyn SpiderMiddleware<String>>>) -> SpiderMiddlewareManager<String> {
        SpiderMiddlewareManager::new(
            middlewares
                .into_iter()
                .map(|mw| (mw.name().to_string(), mw))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_input_runs_ascending_and_stops_at_first_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut rejecting = Tagger::new("b", &log);
        rejecting.reject_input = true;
        let manager = manager(vec![
            Arc::new(Tagger::new("a", &log)),
            Arc::new(rejecting),
            Arc::new(Tagger::new("c", &log)),
        ]);

        let err = manager.process_spider_input(&response()).await.unwrap_err();
        assert_eq!(err.to_string(), "rejected by b");
        assert_eq!(*log.lock(), vec!["input:a", "input:b"]);
    }

    #[tokio::test]
    async fn test_output_runs_descending() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(vec![
            Arc::new(Tagger::new("a", &log)),
            Arc::new(Tagger::new("b", &log)),
        ]);

        let result = stream::iter(vec![item("x"), item("y")]).boxed();
        let outputs: Vec<_> = manager.scrape_output(response(), result).collect().await;
        assert_eq!(items(&outputs), vec!["xba", "yba"]);
    }

    #[tokio::test]
    async fn test_callback_error_recovered_after_main_output() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut recovering = Tagger::new("a", &log);
        recovering.recover = Some(vec!["r"]);
        let manager = manager(vec![
            Arc::new(Tagger::new("outer", &log)),
            Arc::new(recovering),
            Arc::new(Tagger::new("b", &log)),
        ]);

        let result = stream::iter(vec![item("x"), boom("callback failed"), item("never")]).boxed();
        let outputs: Vec<_> = manager.scrape_output(response(), result).collect().await;

        // Recovered output skips the output hooks of "a" and everything
        // closer to the spider.
        assert_eq!(items(&outputs), vec!["xbaouter", "router"]);
        assert!(outputs.iter().all(Result::is_ok));
        assert_eq!(
            *log.lock(),
            vec!["exception:b:callback failed", "exception:a:callback failed"]
        );
    }

    #[tokio::test]
    async fn test_error_in_middleware_output_starts_after_it() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut inner = Tagger::new("inner", &log);
        inner.recover = Some(vec!["never"]);
        let mut outer = Tagger::new("outer", &log);
        outer.recover = Some(vec!["r"]);
        let manager = manager(vec![
            Arc::new(outer),
            Arc::new(FailingOutput),
            Arc::new(inner),
        ]);

        let result = stream::iter(vec![item("x"), item("y")]).boxed();
        let outputs: Vec<_> = manager.scrape_output(response(), result).collect().await;

        assert_eq!(items(&outputs), vec!["xinnerouter", "r"]);
        assert_eq!(*log.lock(), vec!["exception:outer:output failed"]);
    }

    #[tokio::test]
    async fn test_unhandled_error_surfaces_once_at_the_end() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(vec![
            Arc::new(Tagger::new("a", &log)),
            Arc::new(Tagger::new("b", &log)),
        ]);

        let result = stream::iter(vec![item("x"), boom("callback failed"), item("never")]).boxed();
        let outputs: Vec<_> = manager.scrape_output(response(), result).collect().await;

        assert_eq!(outputs.len(), 2);
        assert_eq!(items(&outputs), vec!["xba"]);
        assert_eq!(
            outputs[1].as_ref().unwrap_err().to_string(),
            "callback failed"
        );
        // Each hook is offered the error once.
        assert_eq!(
            *log.lock(),
            vec!["exception:b:callback failed", "exception:a:callback failed"]
        );
    }

    #[tokio::test]
    async fn test_process_spider_exception_entry_point() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut recovering = Tagger::new("b", &log);
        recovering.recover = Some(vec!["r"]);
        let manager = manager(vec![Arc::new(Tagger::new("a", &log)), Arc::new(recovering)]);

        let recovered = manager
            .process_spider_exception(response(), SpiderError::GeneralError("x".into()), 0)
            .unwrap();
        let outputs: Vec<_> = recovered.collect().await;
        assert_eq!(items(&outputs), vec!["ra"]);

        // Starting past the recovering middleware, nobody handles it.
        let err = manager
            .process_spider_exception(response(), SpiderError::GeneralError("y".into()), 1)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "y");
    }

    #[tokio::test]
    async fn test_empty_recovery_swallows_error() {
        struct Swallow;

        impl SpiderMiddleware<String> for Swallow {
            fn name(&self) -> &str {
                "swallow"
            }

            fn process_spider_exception<'a>(
                &'a self,
                _response: Arc<Response>,
                _error: &SpiderError,
            ) -> Option<OutputStream<'a, String>> {
                Some(empty_output())
            }
        }

        let manager = manager(vec![Arc::new(Swallow)]);
        let result = stream::iter(vec![item("x"), boom("gone")]).boxed();
        let outputs: Vec<_> = manager.scrape_output(response(), result).collect().await;
        assert_eq!(items(&outputs), vec!["x"]);
        assert_eq!(outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_start_runs_descending() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(vec![
            Arc::new(Tagger::new("a", &log)),
            Arc::new(Tagger::new("b", &log)),
        ]);
        let start = stream::iter(vec![Ok(SpiderOutput::Request(
            Request::get("http://example.com/").unwrap(),
        ))])
        .boxed();
        let outputs: Vec<_> = manager.process_start(start).collect().await;
        assert_eq!(outputs.len(), 1);
        assert_eq!(*log.lock(), vec!["start:b", "start:a"]);
    }

    #[test]
    fn test_from_settings_skips_not_configured() {
        let registry = MiddlewareRegistry::<String>::with_builtins();
        let settings = Settings {
            urllength_limit: 0,
            ..Settings::default()
        };
        let ctx = MiddlewareContext {
            settings: &settings,
            stats: Arc::new(StatCollector::new()),
            spider_name: "test",
            spider_httpstatus_list: None,
        };
        let manager = SpiderMiddlewareManager::from_settings(&registry, &ctx).unwrap();
        assert_eq!(manager.names(), vec!["start", "http_error", "referer", "depth"]);

        let mut settings = Settings::default();
        settings.spider_middlewares.insert("custom".to_string(), Some(10));
        let ctx = MiddlewareContext {
            settings: &settings,
            ..ctx
        };
        assert!(matches!(
            SpiderMiddlewareManager::from_settings(&registry, &ctx),
            Err(SpiderError::ConfigurationError(_))
        ));
    }
}
