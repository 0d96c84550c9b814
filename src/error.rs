//! Error types shared by the scraper, the middleware chain and spiders.

use http::StatusCode;
use thiserror::Error;
use url::Url;

/// Errors raised while scraping a response or configuring the scraper.
#[derive(Debug, Error)]
pub enum SpiderError {
    /// Invalid settings or builder configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A response whose status code is not handled by the spider.
    #[error("Ignoring non-200 response ({status}) for {url}")]
    HttpError { status: StatusCode, url: Url },

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    GeneralError(String),

    /// Any other failure raised by user code (spider callbacks, custom middlewares).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpiderError {
    /// Stable name of the error variant, used to build stats keys.
    pub fn kind(&self) -> &'static str {
        match self {
            SpiderError::ConfigurationError(_) => "ConfigurationError",
            SpiderError::HttpError { .. } => "HttpError",
            SpiderError::UrlParseError(_) => "UrlParseError",
            SpiderError::JsonError(_) => "JsonError",
            SpiderError::IoError(_) => "IoError",
            SpiderError::GeneralError(_) => "GeneralError",
            SpiderError::Other(_) => "Other",
        }
    }
}
