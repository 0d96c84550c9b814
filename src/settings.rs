//! # Settings Module
//!
//! Configuration for the scraper and the built-in spider middlewares.
//!
//! Settings deserialize from JSON with the conventional upper-case keys, and
//! every key is optional:
//!
//! ```json
//! {
//!     "SPIDER_MIDDLEWARES": { "my_filter": 543, "referer": null },
//!     "DEPTH_LIMIT": 3,
//!     "HTTPERROR_ALLOWED_CODES": [404],
//!     "REFERRER_POLICY": "same-origin"
//! }
//! ```
//!
//! Middleware orders: lower values sit closer to the engine, so their input
//! hook runs first and their output hook runs last. A `null` order disables
//! a middleware.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::SpiderError;

/// Identifier of the start-request middleware.
pub const START_MIDDLEWARE: &str = "start";
/// Identifier of the HTTP error middleware.
pub const HTTP_ERROR_MIDDLEWARE: &str = "http_error";
/// Identifier of the Referer middleware.
pub const REFERER_MIDDLEWARE: &str = "referer";
/// Identifier of the URL length middleware.
pub const URL_LENGTH_MIDDLEWARE: &str = "url_length";
/// Identifier of the depth middleware.
pub const DEPTH_MIDDLEWARE: &str = "depth";

/// Built-in middleware orders.
pub fn default_spider_middlewares_base() -> BTreeMap<String, Option<i32>> {
    [
        (START_MIDDLEWARE, 25),
        (HTTP_ERROR_MIDDLEWARE, 50),
        (REFERER_MIDDLEWARE, 700),
        (URL_LENGTH_MIDDLEWARE, 800),
        (DEPTH_MIDDLEWARE, 900),
    ]
    .into_iter()
    .map(|(name, order)| (name.to_string(), Some(order)))
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    pub spider_middlewares_base: BTreeMap<String, Option<i32>>,
    /// User middleware orders, merged over the base.
    pub spider_middlewares: BTreeMap<String, Option<i32>>,

    /// Maximum depth of a request; 0 means unlimited.
    pub depth_limit: u64,
    pub depth_stats_verbose: bool,
    /// Priority adjustment per depth level.
    pub depth_priority: i32,

    pub httperror_allowed_codes: Vec<u16>,
    pub httperror_allow_all: bool,

    pub referer_enabled: bool,
    pub referrer_policy: String,

    /// Maximum URL length; 0 disables the URL length middleware.
    pub urllength_limit: usize,

    /// Number of concurrent scraping workers.
    pub scraper_workers: usize,
    pub channel_capacity: usize,

    // Close-spider thresholds; 0 disables each one.
    pub closespider_itemcount: usize,
    pub closespider_pagecount: usize,
    pub closespider_pagecount_no_item: usize,
    pub closespider_errorcount: usize,
    /// Seconds since the scraper task started.
    pub closespider_timeout: f64,
    /// Seconds without a scraped item.
    pub closespider_timeout_no_item: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            spider_middlewares_base: default_spider_middlewares_base(),
            spider_middlewares: BTreeMap::new(),
            depth_limit: 0,
            depth_stats_verbose: false,
            depth_priority: 0,
            httperror_allowed_codes: Vec::new(),
            httperror_allow_all: false,
            referer_enabled: true,
            referrer_policy: "scrapy-default".to_string(),
            urllength_limit: 2083,
            scraper_workers: num_cpus::get().clamp(4, 16),
            channel_capacity: 1000,
            closespider_itemcount: 0,
            closespider_pagecount: 0,
            closespider_pagecount_no_item: 0,
            closespider_errorcount: 0,
            closespider_timeout: 0.0,
            closespider_timeout_no_item: 0.0,
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, SpiderError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SpiderError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), SpiderError> {
        if self.scraper_workers == 0 {
            return Err(SpiderError::ConfigurationError(
                "SCRAPER_WORKERS must be greater than 0.".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(SpiderError::ConfigurationError(
                "CHANNEL_CAPACITY must be greater than 0.".to_string(),
            ));
        }
        for (key, value) in [
            ("CLOSESPIDER_TIMEOUT", self.closespider_timeout),
            ("CLOSESPIDER_TIMEOUT_NO_ITEM", self.closespider_timeout_no_item),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SpiderError::ConfigurationError(format!(
                    "{} must be a non-negative number of seconds.",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Enabled middleware identifiers, sorted by ascending order.
    ///
    /// User entries override base entries with the same identifier; ties are
    /// broken by identifier.
    pub fn middleware_order(&self) -> Vec<(String, i32)> {
        let mut merged = self.spider_middlewares_base.clone();
        merged.extend(
            self.spider_middlewares
                .iter()
                .map(|(name, order)| (name.clone(), *order)),
        );

        let mut enabled: Vec<(String, i32)> = merged
            .into_iter()
            .filter_map(|(name, order)| order.map(|order| (name, order)))
            .collect();
        // BTreeMap iteration is sorted by name, and the sort is stable.
        enabled.sort_by_key(|(_, order)| *order);
        enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_order() {
        let settings = Settings::default();
        let names: Vec<String> = settings
            .middleware_order()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            names,
            vec!["start", "http_error", "referer", "url_length", "depth"]
        );
    }

    #[test]
    fn test_user_entries_override_and_disable() {
        let mut settings = Settings::default();
        settings
            .spider_middlewares
            .insert("custom".to_string(), Some(750));
        settings
            .spider_middlewares
            .insert(REFERER_MIDDLEWARE.to_string(), None);
        settings
            .spider_middlewares
            .insert(DEPTH_MIDDLEWARE.to_string(), Some(10));

        let order = settings.middleware_order();
        assert_eq!(
            order,
            vec![
                ("depth".to_string(), 10),
                ("start".to_string(), 25),
                ("http_error".to_string(), 50),
                ("custom".to_string(), 750),
                ("url_length".to_string(), 800),
            ]
        );
    }

    #[test]
    fn test_ties_sorted_by_name() {
        let mut settings = Settings::default();
        settings.spider_middlewares_base.clear();
        settings.spider_middlewares.insert("b".to_string(), Some(1));
        settings.spider_middlewares.insert("a".to_string(), Some(1));
        let order = settings.middleware_order();
        assert_eq!(order[0].0, "a");
        assert_eq!(order[1].0, "b");
    }

    #[test]
    fn test_from_json() {
        let settings = Settings::from_json_str(
            r#"{
                "SPIDER_MIDDLEWARES": {"referer": null},
                "DEPTH_LIMIT": 2,
                "HTTPERROR_ALLOWED_CODES": [404, 410],
                "URLLENGTH_LIMIT": 100
            }"#,
        )
        .unwrap();
        assert_eq!(settings.depth_limit, 2);
        assert_eq!(settings.httperror_allowed_codes, vec![404, 410]);
        assert_eq!(settings.urllength_limit, 100);
        assert!(settings.referer_enabled);
        assert_eq!(settings.referrer_policy, "scrapy-default");
        assert!(
            !settings
                .middleware_order()
                .iter()
                .any(|(name, _)| name == REFERER_MIDDLEWARE)
        );
    }

    #[test]
    fn test_closespider_settings() {
        let settings = Settings::from_json_str(
            r#"{"CLOSESPIDER_ITEMCOUNT": 10, "CLOSESPIDER_TIMEOUT": 1.5}"#,
        )
        .unwrap();
        assert_eq!(settings.closespider_itemcount, 10);
        assert_eq!(settings.closespider_pagecount, 0);
        assert_eq!(settings.closespider_timeout, 1.5);

        let result = Settings::from_json_str(r#"{"CLOSESPIDER_TIMEOUT_NO_ITEM": -1}"#);
        assert!(matches!(result, Err(SpiderError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_json_file_rejects_zero_workers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"SCRAPER_WORKERS": 0}}"#).unwrap();
        let result = Settings::from_json_file(file.path());
        assert!(matches!(result, Err(SpiderError::ConfigurationError(_))));
    }
}
