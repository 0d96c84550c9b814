//! Filters out unsuccessful responses before they reach the spider.
//!
//! A non-2xx response only reaches the callback when its status is allowed,
//! either through the request meta, the spider's `handle_httpstatus_list`,
//! or the `HTTPERROR_ALLOW_ALL` / `HTTPERROR_ALLOWED_CODES` settings.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::error::SpiderError;
use crate::item::{OutputStream, ScrapedItem, empty_output};
use crate::middleware::{MiddlewareContext, SpiderMiddleware};
use crate::request::{META_HANDLE_HTTPSTATUS_ALL, META_HANDLE_HTTPSTATUS_LIST};
use crate::response::Response;
use crate::stats::StatCollector;

pub struct HttpErrorMiddleware {
    handle_httpstatus_all: bool,
    handle_httpstatus_list: Vec<u16>,
    stats: Arc<StatCollector>,
}

impl HttpErrorMiddleware {
    pub fn new(
        handle_httpstatus_all: bool,
        handle_httpstatus_list: Vec<u16>,
        stats: Arc<StatCollector>,
    ) -> Self {
        HttpErrorMiddleware {
            handle_httpstatus_all,
            handle_httpstatus_list,
            stats,
        }
    }

    /// The spider's own status list takes precedence over
    /// `HTTPERROR_ALLOWED_CODES`.
    pub fn from_context(ctx: &MiddlewareContext<'_>) -> Self {
        let allowed = ctx
            .spider_httpstatus_list
            .clone()
            .unwrap_or_else(|| ctx.settings.httperror_allowed_codes.clone());
        Self::new(ctx.settings.httperror_allow_all, allowed, Arc::clone(&ctx.stats))
    }

    fn is_allowed(&self, response: &Response) -> bool {
        if response.is_success() {
            return true;
        }
        let status = response.status.as_u16();

        let meta = response.meta();
        if meta
            .get(META_HANDLE_HTTPSTATUS_ALL)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return true;
        }
        if let Some(list) = meta.get(META_HANDLE_HTTPSTATUS_LIST) {
            return list
                .as_array()
                .is_some_and(|codes| codes.iter().any(|code| code.as_u64() == Some(status.into())));
        }
        if self.handle_httpstatus_all {
            return true;
        }
        self.handle_httpstatus_list.contains(&status)
    }
}

#[async_trait]
impl<I: ScrapedItem> SpiderMiddleware<I> for HttpErrorMiddleware {
    fn name(&self) -> &str {
        "HttpErrorMiddleware"
    }

    async fn process_spider_input(&self, response: &Response) -> Result<(), SpiderError> {
        if self.is_allowed(response) {
            return Ok(());
        }
        Err(SpiderError::HttpError {
            status: response.status,
            url: response.url.clone(),
        })
    }

    fn process_spider_exception<'a>(
        &'a self,
        response: Arc<Response>,
        error: &SpiderError,
    ) -> Option<OutputStream<'a, I>> {
        let SpiderError::HttpError { status, .. } = error else {
            return None;
        };
        self.stats.inc_value("httperror/response_ignored_count", 1);
        self.stats.inc_value(
            &format!("httperror/response_ignored_status_count/{}", status.as_u16()),
            1,
        );
        info!(
            "Ignoring response {}: HTTP status code is not handled or not allowed",
            response
        );
        Some(empty_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::settings::Settings;
    use futures_util::StreamExt;
    use http::StatusCode;

    fn response(status: u16) -> Response {
        Response::new(Request::get("http://example.com/page").unwrap())
            .with_status(StatusCode::from_u16(status).unwrap())
    }

    fn response_with_meta(status: u16, key: &str, value: impl Into<Value>) -> Response {
        let request = Request::get("http://example.com/page")
            .unwrap()
            .with_meta(key, value);
        Response::new(request).with_status(StatusCode::from_u16(status).unwrap())
    }

    async fn input(mw: &HttpErrorMiddleware, response: &Response) -> Result<(), SpiderError> {
        SpiderMiddleware::<u8>::process_spider_input(mw, response).await
    }

    #[tokio::test]
    async fn test_success_passes_and_errors_are_raised() {
        let mw = HttpErrorMiddleware::new(false, Vec::new(), Arc::new(StatCollector::new()));
        assert!(input(&mw, &response(200)).await.is_ok());
        assert!(input(&mw, &response(204)).await.is_ok());

        let err = input(&mw, &response(404)).await.unwrap_err();
        assert!(matches!(
            err,
            SpiderError::HttpError { status, .. } if status == StatusCode::NOT_FOUND
        ));
        assert!(input(&mw, &response(302)).await.is_err());
    }

    #[tokio::test]
    async fn test_meta_overrides_settings() {
        let mw = HttpErrorMiddleware::new(true, vec![404], Arc::new(StatCollector::new()));

        let resp = response_with_meta(500, META_HANDLE_HTTPSTATUS_ALL, true);
        assert!(input(&mw, &resp).await.is_ok());

        // A meta list replaces both ALLOW_ALL and the allowed codes.
        let resp = response_with_meta(404, META_HANDLE_HTTPSTATUS_LIST, vec![402]);
        assert!(input(&mw, &resp).await.is_err());
        let resp = response_with_meta(402, META_HANDLE_HTTPSTATUS_LIST, vec![402]);
        assert!(input(&mw, &resp).await.is_ok());

        assert!(input(&mw, &response(500)).await.is_ok());
    }

    #[tokio::test]
    async fn test_spider_list_takes_precedence_over_settings() {
        let settings = Settings {
            httperror_allowed_codes: vec![404],
            ..Settings::default()
        };
        let ctx = MiddlewareContext {
            settings: &settings,
            stats: Arc::new(StatCollector::new()),
            spider_name: "test",
            spider_httpstatus_list: Some(vec![402]),
        };
        let mw = HttpErrorMiddleware::from_context(&ctx);
        assert!(input(&mw, &response(402)).await.is_ok());
        assert!(input(&mw, &response(404)).await.is_err());

        let ctx = MiddlewareContext {
            spider_httpstatus_list: None,
            ..ctx
        };
        let mw = HttpErrorMiddleware::from_context(&ctx);
        assert!(input(&mw, &response(404)).await.is_ok());
    }

    #[tokio::test]
    async fn test_exception_hook_counts_and_swallows_http_errors() {
        let stats = Arc::new(StatCollector::new());
        let mw = HttpErrorMiddleware::new(false, Vec::new(), Arc::clone(&stats));
        let resp = Arc::new(response(404));

        let error = input(&mw, &resp).await.unwrap_err();
        let recovered = SpiderMiddleware::<u8>::process_spider_exception(&mw, Arc::clone(&resp), &error)
            .expect("http errors are handled");
        assert_eq!(recovered.count().await, 0);
        assert_eq!(stats.get_value("httperror/response_ignored_count"), Some(1));
        assert_eq!(
            stats.get_value("httperror/response_ignored_status_count/404"),
            Some(1)
        );

        let other = SpiderError::GeneralError("boom".to_string());
        assert!(SpiderMiddleware::<u8>::process_spider_exception(&mw, resp, &other).is_none());
    }
}
