//! Module for tracking the operational state of the scraper.
//!
//! `ScraperState` uses atomic counters to keep track of:
//! - The number of responses queued for a scraping worker.
//! - The number of responses actively being scraped.
//! - The number of outputs being handed to the engine's channels.
//!
//! The engine polls `is_idle` to decide when the scraping stage has drained.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Represents the shared state of the scraper's tasks.
#[derive(Debug, Default)]
pub struct ScraperState {
    /// The number of responses waiting for a worker.
    pub queued_responses: AtomicUsize,
    /// The number of responses currently being scraped.
    pub scraping_responses: AtomicUsize,
    /// The number of requests and items currently being sent out.
    pub sending_outputs: AtomicUsize,
}

impl ScraperState {
    /// Creates a new, atomically reference-counted `ScraperState`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Checks if all scraper activities are idle.
    pub fn is_idle(&self) -> bool {
        self.queued_responses.load(Ordering::SeqCst) == 0
            && self.scraping_responses.load(Ordering::SeqCst) == 0
            && self.sending_outputs.load(Ordering::SeqCst) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_idle() {
        let state = ScraperState::new();
        assert!(state.is_idle());

        state.scraping_responses.fetch_add(1, Ordering::SeqCst);
        assert!(!state.is_idle());
        state.scraping_responses.fetch_sub(1, Ordering::SeqCst);
        assert!(state.is_idle());
    }
}
