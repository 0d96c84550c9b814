//! # Statistics Module
//!
//! Collects metrics about the scraper and its spider middlewares.
//!
//! ## Overview
//!
//! The `StatCollector` tracks fixed counters for the scraping stage (responses
//! scraped, items scraped, requests produced, spider errors) and a map of named
//! values that middlewares update, such as `request_depth_max`,
//! `httperror/response_ignored_count` or `urllength/request_ignored_count`.
//!
//! ## Features
//!
//! - **Thread-Safe**: Atomic counters and a concurrent map for named values
//! - **Export Formats**: JSON and Markdown export, plus a compact `Display`
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_chain::stats::StatCollector;
//!
//! let stats = StatCollector::new();
//! stats.inc_value("urllength/request_ignored_count", 1);
//! stats.max_value("request_depth_max", 3);
//!
//! println!("{}", stats.to_json_string_pretty().unwrap());
//! println!("{}", stats.to_markdown_string());
//! ```

use crate::error::SpiderError;
use dashmap::DashMap;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

// A snapshot of the current statistics, used for reporting.
struct StatsSnapshot {
    responses_scraped: usize,
    items_scraped: usize,
    requests_produced: usize,
    spider_errors: usize,
    values: BTreeMap<String, i64>,
    elapsed_duration: Duration,
}

impl StatsSnapshot {
    fn formatted_duration(&self) -> String {
        format!("{:?}", self.elapsed_duration)
    }

    fn items_per_second(&self) -> f64 {
        let total_seconds = self.elapsed_duration.as_secs();
        if total_seconds > 0 {
            self.items_scraped as f64 / total_seconds as f64
        } else {
            0.0
        }
    }

    fn responses_per_second(&self) -> f64 {
        let total_seconds = self.elapsed_duration.as_secs();
        if total_seconds > 0 {
            self.responses_scraped as f64 / total_seconds as f64
        } else {
            0.0
        }
    }
}

/// Collects and stores statistics about the scraping stage.
#[derive(Debug, serde::Serialize)]
pub struct StatCollector {
    #[serde(skip)]
    pub start_time: Instant,

    pub responses_scraped: AtomicUsize,
    pub items_scraped: AtomicUsize,
    pub requests_produced: AtomicUsize,
    pub spider_errors: AtomicUsize,

    // Named values, e.g. "request_depth_count/2"
    pub values: Arc<DashMap<String, i64>>,
}

impl StatCollector {
    /// Creates a new `StatCollector` with all counters initialized to zero.
    pub fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            responses_scraped: AtomicUsize::new(0),
            items_scraped: AtomicUsize::new(0),
            requests_produced: AtomicUsize::new(0),
            spider_errors: AtomicUsize::new(0),
            values: Arc::new(DashMap::new()),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let values = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        StatsSnapshot {
            responses_scraped: self.responses_scraped.load(Ordering::SeqCst),
            items_scraped: self.items_scraped.load(Ordering::SeqCst),
            requests_produced: self.requests_produced.load(Ordering::SeqCst),
            spider_errors: self.spider_errors.load(Ordering::SeqCst),
            values,
            elapsed_duration: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_responses_scraped(&self) {
        self.responses_scraped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_scraped(&self) {
        self.items_scraped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_produced(&self) {
        self.requests_produced.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts an unhandled spider error, in total and per error kind.
    pub(crate) fn record_spider_error(&self, error: &SpiderError) {
        self.spider_errors.fetch_add(1, Ordering::SeqCst);
        self.inc_value("spider_exceptions/count", 1);
        self.inc_value(&format!("spider_exceptions/{}", error.kind()), 1);
    }

    /// Adds `count` to a named value, starting from zero.
    pub fn inc_value(&self, key: &str, count: i64) {
        *self.values.entry(key.to_string()).or_insert(0) += count;
    }

    /// Stores `value` if it is greater than the current one.
    pub fn max_value(&self, key: &str, value: i64) {
        self.values
            .entry(key.to_string())
            .and_modify(|current| *current = (*current).max(value))
            .or_insert(value);
    }

    pub fn set_value(&self, key: &str, value: i64) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get_value(&self, key: &str) -> Option<i64> {
        self.values.get(key).map(|v| *v.value())
    }

    /// Converts the statistics into a JSON string.
    pub fn to_json_string(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Converts the statistics into a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Exports the current statistics to a Markdown formatted string.
    pub fn to_markdown_string(&self) -> String {
        let snapshot = self.snapshot();

        let values_list: String = snapshot
            .values
            .iter()
            .map(|(key, value)| format!("| {} | {} |", key, value))
            .collect::<Vec<String>>()
            .join("\n");
        let values_output = if values_list.is_empty() {
            "N/A".to_string()
        } else {
            format!("| Key | Value |\n|-----|-------|\n{}", values_list)
        };

        format!(
            r#"# Scraper Statistics Report

- **Duration**: {}
- **Average Speed**: {:.2} resp/s, {:.2} item/s

## Scraper
| Metric            | Count |
|-------------------|-------|
| Responses scraped | {}     |
| Items scraped     | {}     |
| Requests produced | {}     |
| Spider errors     | {}     |

## Middleware Values
{}
"#,
            snapshot.formatted_duration(),
            snapshot.responses_per_second(),
            snapshot.items_per_second(),
            snapshot.responses_scraped,
            snapshot.items_scraped,
            snapshot.requests_produced,
            snapshot.spider_errors,
            values_output
        )
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nScraper Statistics")?;
        writeln!(f, "------------------")?;
        writeln!(f, "  duration : {}", snapshot.formatted_duration())?;
        writeln!(
            f,
            "  scraped  : responses: {}, items: {}, requests: {}, errors: {}",
            snapshot.responses_scraped,
            snapshot.items_scraped,
            snapshot.requests_produced,
            snapshot.spider_errors
        )?;

        let values_string = if snapshot.values.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .values
                .iter()
                .map(|(key, value)| format!("{}: {}", key, value))
                .collect::<Vec<String>>()
                .join(", ")
        };

        writeln!(f, "  values   : {}\n", values_string)
    }
}
