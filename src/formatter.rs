//! Log message helpers for scraper events.
//!
//! Keeps the wording of "Crawled", "Scraped from" and "Spider error"
//! messages in one place so log lines stay uniform.

use std::fmt::Debug;

use crate::error::SpiderError;
use crate::request::Request;
use crate::response::Response;

fn format_flags(flags: &[String]) -> String {
    if flags.is_empty() {
        return String::new();
    }
    let quoted: Vec<String> = flags.iter().map(|flag| format!("'{}'", flag)).collect();
    format!(" [{}]", quoted.join(", "))
}

fn referer_of(request: &Request) -> String {
    request
        .header("referer")
        .unwrap_or_else(|| "None".to_string())
}

/// `Crawled (200) <GET url> ['flag'] (referer: None) ['cached']`
pub fn crawled(request: &Request, response: &Response) -> String {
    format!(
        "Crawled ({}) {}{} (referer: {}){}",
        response.status.as_u16(),
        request,
        format_flags(&request.flags),
        referer_of(request),
        format_flags(&response.flags)
    )
}

/// `Scraped from <200 url>` followed by the item on its own line.
pub fn scraped<I: Debug>(item: &I, response: &Response) -> String {
    format!("Scraped from {}\n{:?}", response, item)
}

/// `Spider error processing <GET url> (referer: None): error`
pub fn spider_error(error: &SpiderError, request: &Request) -> String {
    format!(
        "Spider error processing {} (referer: {}): {}",
        request,
        referer_of(request),
        error
    )
}
