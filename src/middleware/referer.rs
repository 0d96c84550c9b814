//! Populates the `Referer` header of requests produced from a response.
//!
//! The referrer policy for each request comes from, in order: the request's
//! `referrer_policy` meta, the parent response's `Referrer-Policy` header,
//! and the `REFERRER_POLICY` setting.

use http::header::REFERER;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::SpiderError;
use crate::item::{OutputStream, ScrapedItem};
use crate::middleware::{
    MiddlewareContext, OutputFilter, ReferrerPolicy, SpiderMiddleware, filter_outputs,
};
use crate::request::{META_REDIRECT_URLS, META_REFERRER_POLICY, Request};
use crate::response::Response;

const REFERRER_POLICY_HEADER: &str = "referrer-policy";

#[derive(Debug, Clone)]
pub struct RefererMiddleware {
    default_policy: ReferrerPolicy,
}

impl RefererMiddleware {
    pub fn new(default_policy: ReferrerPolicy) -> Self {
        RefererMiddleware { default_policy }
    }

    /// Returns `Ok(None)` when `REFERER_ENABLED` is false.
    pub fn from_context(ctx: &MiddlewareContext<'_>) -> Result<Option<Self>, SpiderError> {
        if !ctx.settings.referer_enabled {
            debug!("RefererMiddleware disabled by REFERER_ENABLED");
            return Ok(None);
        }
        let default_policy = ctx.settings.referrer_policy.parse()?;
        Ok(Some(Self::new(default_policy)))
    }

    pub fn default_policy(&self) -> ReferrerPolicy {
        self.default_policy
    }

    /// Picks the policy for `request`, sent from `response` if there is one.
    pub fn policy(&self, response: Option<&Response>, request: &Request) -> ReferrerPolicy {
        let name = match request.meta_value(META_REFERRER_POLICY) {
            Some(Value::String(name)) => Some(name.clone()),
            Some(other) => Some(other.to_string()),
            None => response.and_then(|r| r.header(REFERRER_POLICY_HEADER)),
        };

        match name {
            None => self.default_policy,
            Some(name) => ReferrerPolicy::parse_list(&name).unwrap_or_else(|| {
                warn!("Could not load referrer policy '{}'", name);
                self.default_policy
            }),
        }
    }

    /// Recomputes the `Referer` of a redirected request.
    ///
    /// Requests without redirect history or without a `Referer` are left
    /// alone. When the policy forbids a referrer for the new URL, the header
    /// is removed.
    pub fn update_redirected_request(&self, request: &mut Request) {
        let redirected = request
            .meta_value(META_REDIRECT_URLS)
            .and_then(Value::as_array)
            .is_some_and(|urls| !urls.is_empty());
        if !redirected {
            return;
        }
        let Some(current) = request.header(REFERER.as_str()) else {
            return;
        };
        let Ok(parent_url) = Url::parse(&current) else {
            warn!("Ignoring unparsable Referer '{}' on {}", current, request);
            return;
        };

        let policy = self.policy(None, request);
        match policy.referrer(&parent_url, &request.url) {
            Some(referrer) if referrer == current => {}
            Some(referrer) => {
                request.headers.remove(REFERER);
                if !request.set_header_default(REFERER, &referrer) {
                    warn!("Invalid Referer value '{}' for {}", referrer, request);
                }
            }
            None => {
                request.headers.remove(REFERER);
            }
        }
    }
}

impl OutputFilter for RefererMiddleware {
    fn process_request(&self, mut request: Request, response: Option<&Response>) -> Option<Request> {
        let Some(response) = response else {
            return Some(request);
        };
        let policy = self.policy(Some(response), &request);
        if let Some(referrer) = policy.referrer(&response.url, &request.url) {
            if !request.set_header_default(REFERER, &referrer) {
                warn!("Invalid Referer value '{}' for {}", referrer, request);
            }
        }
        Some(request)
    }
}

impl<I: ScrapedItem> SpiderMiddleware<I> for RefererMiddleware {
    fn name(&self) -> &str {
        "RefererMiddleware"
    }

    fn process_spider_output<'a>(
        &'a self,
        response: Arc<Response>,
        result: OutputStream<'a, I>,
    ) -> OutputStream<'a, I> {
        filter_outputs(self, Some(response), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SpiderOutput;
    use crate::settings::Settings;
    use crate::stats::StatCollector;
    use futures_util::stream::{self, StreamExt};
    use http::HeaderValue;

    fn response(url: &str) -> Response {
        Response::new(Request::get(url).unwrap())
    }

    fn apply(mw: &RefererMiddleware, response: &Response, request: Request) -> Request {
        mw.process_request(request, Some(response)).unwrap()
    }

    #[test]
    fn test_sets_referer_with_default_policy() {
        let mw = RefererMiddleware::new(ReferrerPolicy::Default);
        let parent = response("http://example.com/page#top");
        let request = apply(&mw, &parent, Request::get("http://example.com/next").unwrap());
        assert_eq!(
            request.header("referer").as_deref(),
            Some("http://example.com/page")
        );

        let parent = response("https://example.com/page");
        let request = apply(&mw, &parent, Request::get("http://example.com/next").unwrap());
        assert_eq!(request.header("referer"), None);
    }

    #[test]
    fn test_existing_referer_is_kept() {
        let mw = RefererMiddleware::new(ReferrerPolicy::UnsafeUrl);
        let parent = response("http://example.com/page");
        let request = Request::get("http://example.com/next")
            .unwrap()
            .with_header("Referer", "http://custom.example/")
            .unwrap();
        let request = apply(&mw, &parent, request);
        assert_eq!(
            request.header("referer").as_deref(),
            Some("http://custom.example/")
        );
    }

    #[test]
    fn test_meta_policy_overrides_header_and_default() {
        let mw = RefererMiddleware::new(ReferrerPolicy::UnsafeUrl);
        let parent = response("http://example.com/page").with_header(
            http::HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("origin"),
        );

        let request = apply(&mw, &parent, Request::get("http://other.com/").unwrap());
        assert_eq!(request.header("referer").as_deref(), Some("http://example.com/"));

        let request = Request::get("http://other.com/")
            .unwrap()
            .with_meta(META_REFERRER_POLICY, "no-referrer");
        let request = apply(&mw, &parent, request);
        assert_eq!(request.header("referer"), None);
    }

    #[test]
    fn test_unknown_meta_policy_falls_back_to_default() {
        let mw = RefererMiddleware::new(ReferrerPolicy::UnsafeUrl);
        let parent = response("https://example.com/page");
        let request = Request::get("http://other.com/")
            .unwrap()
            .with_meta(META_REFERRER_POLICY, "made-up");
        let request = apply(&mw, &parent, request);
        assert_eq!(
            request.header("referer").as_deref(),
            Some("https://example.com/page")
        );
    }

    #[test]
    fn test_from_context() {
        let stats = Arc::new(StatCollector::new());
        let settings = Settings {
            referrer_policy: "same-origin".to_string(),
            ..Settings::default()
        };
        let ctx = MiddlewareContext {
            settings: &settings,
            stats: Arc::clone(&stats),
            spider_name: "test",
            spider_httpstatus_list: None,
        };
        let mw = RefererMiddleware::from_context(&ctx).unwrap().unwrap();
        assert_eq!(mw.default_policy(), ReferrerPolicy::SameOrigin);

        let settings = Settings {
            referrer_policy: "made-up".to_string(),
            ..Settings::default()
        };
        let ctx = MiddlewareContext {
            settings: &settings,
            stats,
            spider_name: "test",
            spider_httpstatus_list: None,
        };
        assert!(matches!(
            RefererMiddleware::from_context(&ctx),
            Err(SpiderError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_redirected_request() {
        let mw = RefererMiddleware::new(ReferrerPolicy::Default);

        let mut request = Request::get("http://example.com/final")
            .unwrap()
            .with_header("Referer", "https://example.com/page")
            .unwrap()
            .with_meta(META_REDIRECT_URLS, vec!["https://example.com/start"]);
        mw.update_redirected_request(&mut request);
        assert_eq!(request.header("referer"), None);

        let mut request = Request::get("https://example.com/final")
            .unwrap()
            .with_header("Referer", "https://example.com/page")
            .unwrap()
            .with_meta(META_REDIRECT_URLS, vec!["https://example.com/start"])
            .with_meta(META_REFERRER_POLICY, "origin");
        mw.update_redirected_request(&mut request);
        assert_eq!(
            request.header("referer").as_deref(),
            Some("https://example.com/")
        );

        let mut request = Request::get("http://example.com/final")
            .unwrap()
            .with_header("Referer", "https://example.com/page")
            .unwrap();
        mw.update_redirected_request(&mut request);
        assert_eq!(
            request.header("referer").as_deref(),
            Some("https://example.com/page")
        );
    }

    #[tokio::test]
    async fn test_items_and_start_requests_pass_through() {
        let mw = RefererMiddleware::new(ReferrerPolicy::UnsafeUrl);
        let start: Vec<Result<SpiderOutput<u8>, SpiderError>> = vec![Ok(SpiderOutput::Request(
            Request::get("http://example.com/").unwrap(),
        ))];
        let outputs: Vec<_> = SpiderMiddleware::<u8>::process_start(&mw, stream::iter(start).boxed())
            .collect()
            .await;
        let request = outputs[0].as_ref().unwrap().as_request().unwrap();
        assert_eq!(request.header("referer"), None);

        let parent = Arc::new(response("http://example.com/page"));
        let result: Vec<Result<SpiderOutput<u8>, SpiderError>> = vec![Ok(SpiderOutput::Item(1))];
        let outputs: Vec<_> = mw
            .process_spider_output(parent, stream::iter(result).boxed())
            .collect()
            .await;
        assert_eq!(outputs[0].as_ref().unwrap().as_item(), Some(&1));
    }
}
