//! # Close Spider Module
//!
//! Stops the scraping stage once a configured threshold is reached.
//!
//! ## Overview
//!
//! `CloseSpider` counts the responses, items and unhandled errors the scraper
//! sees and watches two timeouts. The first threshold reached sets the close
//! reason; later ones are ignored. The scraper task stops taking responses as
//! soon as a reason is set.
//!
//! | Setting                          | Reason                        |
//! |----------------------------------|-------------------------------|
//! | `CLOSESPIDER_ITEMCOUNT`          | `closespider_itemcount`       |
//! | `CLOSESPIDER_PAGECOUNT`          | `closespider_pagecount`       |
//! | `CLOSESPIDER_PAGECOUNT_NO_ITEM`  | `closespider_pagecount_no_item` |
//! | `CLOSESPIDER_ERRORCOUNT`         | `closespider_errorcount`      |
//! | `CLOSESPIDER_TIMEOUT`            | `closespider_timeout`         |
//! | `CLOSESPIDER_TIMEOUT_NO_ITEM`    | `closespider_timeout_no_item` |

use futures_util::future;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, info};

use crate::settings::Settings;

/// Why the scraping stage was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ItemCount,
    PageCount,
    PageCountNoItem,
    ErrorCount,
    Timeout,
    TimeoutNoItem,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ItemCount => "closespider_itemcount",
            CloseReason::PageCount => "closespider_pagecount",
            CloseReason::PageCountNoItem => "closespider_pagecount_no_item",
            CloseReason::ErrorCount => "closespider_errorcount",
            CloseReason::Timeout => "closespider_timeout",
            CloseReason::TimeoutNoItem => "closespider_timeout_no_item",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct CloseSpider {
    item_count: usize,
    page_count: usize,
    page_count_no_item: usize,
    error_count: usize,
    timeout: Option<Duration>,
    timeout_no_item: Option<Duration>,

    items: AtomicUsize,
    pages: AtomicUsize,
    pages_since_item: AtomicUsize,
    errors: AtomicUsize,
    items_in_period: AtomicUsize,

    reason: OnceLock<CloseReason>,
    notify: Notify,
}

fn seconds(value: f64) -> Option<Duration> {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).ok()
    } else {
        None
    }
}

fn reached(count: usize, threshold: usize) -> bool {
    threshold != 0 && count >= threshold
}

impl CloseSpider {
    pub fn from_settings(settings: &Settings) -> Self {
        CloseSpider {
            item_count: settings.closespider_itemcount,
            page_count: settings.closespider_pagecount,
            page_count_no_item: settings.closespider_pagecount_no_item,
            error_count: settings.closespider_errorcount,
            timeout: seconds(settings.closespider_timeout),
            timeout_no_item: seconds(settings.closespider_timeout_no_item),
            items: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
            pages_since_item: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            items_in_period: AtomicUsize::new(0),
            reason: OnceLock::new(),
            notify: Notify::new(),
        }
    }

    /// Counts a response about to be scraped.
    pub fn response_received(&self) {
        let pages = self.pages.fetch_add(1, Ordering::SeqCst) + 1;
        let since_item = self.pages_since_item.fetch_add(1, Ordering::SeqCst) + 1;
        if reached(pages, self.page_count) {
            self.close(CloseReason::PageCount);
        } else if reached(since_item, self.page_count_no_item) {
            self.close(CloseReason::PageCountNoItem);
        }
    }

    pub fn item_scraped(&self) {
        let items = self.items.fetch_add(1, Ordering::SeqCst) + 1;
        self.pages_since_item.store(0, Ordering::SeqCst);
        self.items_in_period.fetch_add(1, Ordering::SeqCst);
        if reached(items, self.item_count) {
            self.close(CloseReason::ItemCount);
        }
    }

    /// Counts a spider error no middleware handled.
    pub fn spider_error(&self) {
        let errors = self.errors.fetch_add(1, Ordering::SeqCst) + 1;
        if reached(errors, self.error_count) {
            self.close(CloseReason::ErrorCount);
        }
    }

    /// Sets the close reason unless one is already set.
    pub fn close(&self, reason: CloseReason) {
        if self.reason.set(reason).is_ok() {
            info!("Closing spider ({})", reason);
            self.notify.notify_one();
        }
    }

    pub fn reason(&self) -> Option<CloseReason> {
        self.reason.get().copied()
    }

    /// Resolves once a close reason is set.
    pub async fn closed(&self) -> CloseReason {
        loop {
            if let Some(reason) = self.reason() {
                return reason;
            }
            self.notify.notified().await;
        }
    }

    /// Runs the configured timeouts, closing with the first one that fires.
    ///
    /// Returns immediately when no timeout is configured.
    pub async fn watch_timeouts(&self) {
        if self.timeout.is_none() && self.timeout_no_item.is_none() {
            return;
        }

        let timeout = async {
            match self.timeout {
                Some(timeout) => {
                    sleep(timeout).await;
                    self.close(CloseReason::Timeout);
                }
                None => future::pending::<()>().await,
            }
        };
        let no_item = async {
            match self.timeout_no_item {
                Some(period) => {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    loop {
                        ticker.tick().await;
                        let items = self.items_in_period.swap(0, Ordering::SeqCst);
                        debug!("{} items scraped in the last {:?}", items, period);
                        if items == 0 {
                            self.close(CloseReason::TimeoutNoItem);
                            return;
                        }
                    }
                }
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = timeout => {}
            _ = no_item => {}
        }
    }
}
