//! A "prelude" for users of the `spider-chain` crate.
//!
//! This prelude re-exports the most commonly used traits and structs so that
//! they can be easily imported.
//!
//! # Example
//!
//! ```
//! use spider_chain::prelude::*;
//! ```

pub use crate::{
    // Core structs
    CloseReason,
    Request,
    Response,
    ScrapeResult,
    Scraper,
    ScraperBuilder,
    Settings,
    SpiderError,
    StatCollector,
    // Core traits
    ScrapedItem,
    Spider,
    SpiderMiddleware,
    // Essential re-exports for trait implementation
    async_trait,
};

pub use crate::item::{OutputStream, ParseOutput, SpiderOutput, empty_output};
pub use crate::middleware::{OutputFilter, ReferrerPolicy, filter_outputs};
pub use std::sync::Arc;
