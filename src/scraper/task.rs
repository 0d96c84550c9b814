//! Tokio tasks feeding scraper output into the engine's channels.
//!
//! `spawn_start_task` sends the processed start output once.
//! `spawn_scraper_task` uses a coordinator-worker pattern: the coordinator
//! receives downloaded responses and hands them to a fixed pool of workers
//! over an internal bounded channel. Each worker scrapes a response and
//! sends the resulting requests and items out. The coordinator stops taking
//! responses once a close-spider threshold is reached.

use futures_util::StreamExt;
use kanal::{AsyncReceiver, AsyncSender};
use std::cmp::max;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::close_spider::CloseReason;
use crate::item::SpiderOutput;
use crate::request::Request;
use crate::response::Response;
use crate::scraper::{ScrapeResult, Scraper};
use crate::spider::Spider;
use crate::state::ScraperState;

/// Sends the spider's processed start output to the request and item channels.
pub fn spawn_start_task<S>(
    scraper: Arc<Scraper<S>>,
    request_tx: AsyncSender<Request>,
    item_tx: AsyncSender<S::Item>,
) -> JoinHandle<()>
where
    S: Spider,
{
    tokio::spawn(async move {
        let mut start = scraper.process_start();
        let mut sent = 0usize;
        while let Some(output) = start.next().await {
            match output {
                Ok(SpiderOutput::Request(request)) => {
                    if request_tx.send(request).await.is_err() {
                        warn!("Request channel closed, stopping start requests");
                        break;
                    }
                    sent += 1;
                }
                Ok(SpiderOutput::Item(item)) => {
                    if item_tx.send(item).await.is_err() {
                        warn!("Item channel closed, stopping start output");
                        break;
                    }
                }
                Err(e) => {
                    error!("Error while processing start requests: {}", e);
                    scraper.get_stats().record_spider_error(&e);
                }
            }
        }
        debug!("Sent {} start requests", sent);
    })
}

/// Spawns the coordinator and `SCRAPER_WORKERS` workers.
///
/// The returned handle completes once `res_rx` is closed or a close-spider
/// threshold is reached, and every worker has drained. It resolves to the
/// close reason, if any.
pub fn spawn_scraper_task<S>(
    scraper: Arc<Scraper<S>>,
    state: Arc<ScraperState>,
    res_rx: AsyncReceiver<Response>,
    request_tx: AsyncSender<Request>,
    item_tx: AsyncSender<S::Item>,
) -> JoinHandle<Option<CloseReason>>
where
    S: Spider,
{
    let workers = scraper.settings().scraper_workers;
    let (internal_tx, internal_rx) = kanal::bounded_async::<Response>(workers * 2);

    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let internal_rx = internal_rx.clone();
        let scraper = Arc::clone(&scraper);
        let state = Arc::clone(&state);
        let request_tx = request_tx.clone();
        let item_tx = item_tx.clone();

        tasks.spawn(async move {
            while let Ok(response) = internal_rx.recv().await {
                state.queued_responses.fetch_sub(1, Ordering::SeqCst);
                state.scraping_responses.fetch_add(1, Ordering::SeqCst);
                trace!("Worker {} scraping {}", worker, response);

                let result = scraper.scrape(response).await;
                send_outputs::<S>(result, &request_tx, &item_tx, &state).await;

                state.scraping_responses.fetch_sub(1, Ordering::SeqCst);
            }
            trace!("Scraper worker {} finished", worker);
        });
    }
    drop(internal_rx);

    let watchdog = {
        let scraper = Arc::clone(&scraper);
        tokio::spawn(async move { scraper.close_spider().watch_timeouts().await })
    };

    tokio::spawn(async move {
        trace!("Scraper coordinator started with {} workers", workers);
        loop {
            let response = tokio::select! {
                biased;
                reason = scraper.close_spider().closed() => {
                    info!("Scraper stopped taking responses ({})", reason);
                    break;
                }
                received = res_rx.recv() => match received {
                    Ok(response) => response,
                    Err(_) => break,
                },
            };

            // Apply backpressure if the item channel is filling up
            if item_tx.len() > workers * max(2, workers / 2) {
                trace!(
                    "Applying backpressure to scraper, item channel occupancy: {}",
                    item_tx.len()
                );
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            state.queued_responses.fetch_add(1, Ordering::SeqCst);
            if internal_tx.send(response).await.is_err() {
                state.queued_responses.fetch_sub(1, Ordering::SeqCst);
                error!("Internal scrape channel closed, cannot send response to a worker.");
                break;
            }
        }

        trace!("Closing internal scrape channel");
        drop(internal_tx);

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("A scraper worker task failed: {:?}", e);
            }
        }
        watchdog.abort();
        trace!("Scraper coordinator finished");
        scraper.close_reason()
    })
}

async fn send_outputs<S: Spider>(
    result: ScrapeResult<S::Item>,
    request_tx: &AsyncSender<Request>,
    item_tx: &AsyncSender<S::Item>,
    state: &ScraperState,
) {
    let ScrapeResult {
        requests, items, ..
    } = result;
    let requests_len = requests.len();
    let items_len = items.len();

    state
        .sending_outputs
        .fetch_add(requests_len + items_len, Ordering::SeqCst);

    let mut request_error_total = 0;
    for request in requests {
        if request_tx.send(request).await.is_err() {
            request_error_total += 1;
        }
    }

    let mut item_error_total = 0;
    for item in items {
        if item_tx.send(item).await.is_err() {
            item_error_total += 1;
        }
    }

    state
        .sending_outputs
        .fetch_sub(requests_len + items_len, Ordering::SeqCst);

    if request_error_total > 0 {
        warn!(
            "Failed to send {} of {} requests.",
            request_error_total, requests_len
        );
    }
    if item_error_total > 0 {
        warn!(
            "Failed to send {} of {} scraped items.",
            item_error_total, items_len
        );
    }
}
