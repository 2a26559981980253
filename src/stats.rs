//! # Statistics
//!
//! `StatCollector` counts what happened to payloads as they moved through the
//! scheduler: requests accepted, rejected, retried and downloaded, responses
//! received and their status codes, items scraped and processed, and errors
//! reported. Counters are atomics, so every pump updates them without locks.
//!
//! ## Example
//!
//! ```rust,ignore
//! let stats = scheduler.stats();
//! println!("{}", stats);
//! println!("{}", stats.to_json_string_pretty()?);
//! ```

use crate::error::SpiderError;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub requests_enqueued: usize,
    pub requests_rejected: usize,
    pub requests_retried: usize,
    pub requests_dropped: usize,
    pub downloads_sent: usize,
    pub downloads_succeeded: usize,
    pub downloads_failed: usize,
    pub responses_received: usize,
    pub responses_retried: usize,
    pub total_bytes_downloaded: usize,
    pub response_status_counts: BTreeMap<u16, usize>,
    pub items_scraped: usize,
    pub items_processed: usize,
    pub items_dropped: usize,
    pub errors_reported: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl StatsSnapshot {
    fn per_second(&self, count: usize) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            count as f64 / secs
        } else {
            0.0
        }
    }

    fn formatted_bytes(&self) -> String {
        const KB: usize = 1024;
        const MB: usize = 1024 * KB;

        if self.total_bytes_downloaded >= MB {
            format!("{:.2} MB", self.total_bytes_downloaded as f64 / MB as f64)
        } else if self.total_bytes_downloaded >= KB {
            format!("{:.2} KB", self.total_bytes_downloaded as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes_downloaded)
        }
    }
}

/// Crawl counters shared by the scheduler and its pumps.
#[derive(Debug)]
pub struct StatCollector {
    start_time: Instant,
    requests_enqueued: AtomicUsize,
    requests_rejected: AtomicUsize,
    requests_retried: AtomicUsize,
    requests_dropped: AtomicUsize,
    downloads_sent: AtomicUsize,
    downloads_succeeded: AtomicUsize,
    downloads_failed: AtomicUsize,
    responses_received: AtomicUsize,
    responses_retried: AtomicUsize,
    total_bytes_downloaded: AtomicUsize,
    response_status_counts: DashMap<u16, usize>,
    items_scraped: AtomicUsize,
    items_processed: AtomicUsize,
    items_dropped: AtomicUsize,
    errors_reported: AtomicUsize,
}

impl StatCollector {
    pub(crate) fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            requests_enqueued: AtomicUsize::new(0),
            requests_rejected: AtomicUsize::new(0),
            requests_retried: AtomicUsize::new(0),
            requests_dropped: AtomicUsize::new(0),
            downloads_sent: AtomicUsize::new(0),
            downloads_succeeded: AtomicUsize::new(0),
            downloads_failed: AtomicUsize::new(0),
            responses_received: AtomicUsize::new(0),
            responses_retried: AtomicUsize::new(0),
            total_bytes_downloaded: AtomicUsize::new(0),
            response_status_counts: DashMap::new(),
            items_scraped: AtomicUsize::new(0),
            items_processed: AtomicUsize::new(0),
            items_dropped: AtomicUsize::new(0),
            errors_reported: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let response_status_counts = self
            .response_status_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        StatsSnapshot {
            requests_enqueued: self.requests_enqueued.load(Ordering::SeqCst),
            requests_rejected: self.requests_rejected.load(Ordering::SeqCst),
            requests_retried: self.requests_retried.load(Ordering::SeqCst),
            requests_dropped: self.requests_dropped.load(Ordering::SeqCst),
            downloads_sent: self.downloads_sent.load(Ordering::SeqCst),
            downloads_succeeded: self.downloads_succeeded.load(Ordering::SeqCst),
            downloads_failed: self.downloads_failed.load(Ordering::SeqCst),
            responses_received: self.responses_received.load(Ordering::SeqCst),
            responses_retried: self.responses_retried.load(Ordering::SeqCst),
            total_bytes_downloaded: self.total_bytes_downloaded.load(Ordering::SeqCst),
            response_status_counts,
            items_scraped: self.items_scraped.load(Ordering::SeqCst),
            items_processed: self.items_processed.load(Ordering::SeqCst),
            items_dropped: self.items_dropped.load(Ordering::SeqCst),
            errors_reported: self.errors_reported.load(Ordering::SeqCst),
            elapsed: self.start_time.elapsed(),
        }
    }

    /// A request passed every filter and was handed to the request pool.
    pub(crate) fn increment_requests_enqueued(&self) {
        self.requests_enqueued.fetch_add(1, Ordering::SeqCst);
    }

    /// A request was refused by the scheme, domain, depth or duplicate filter.
    pub(crate) fn increment_requests_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_retried(&self) {
        self.requests_retried.fetch_add(1, Ordering::SeqCst);
    }

    /// A request ran out of retries.
    pub(crate) fn increment_requests_dropped(&self) {
        self.requests_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_downloads_sent(&self) {
        self.downloads_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_downloads_succeeded(&self) {
        self.downloads_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_downloads_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a downloaded response's status and body size.
    pub(crate) fn record_response(&self, status_code: u16, bytes: usize) {
        self.responses_received.fetch_add(1, Ordering::SeqCst);
        self.total_bytes_downloaded.fetch_add(bytes, Ordering::SeqCst);
        *self.response_status_counts.entry(status_code).or_insert(0) += 1;
    }

    pub(crate) fn increment_responses_retried(&self) {
        self.responses_retried.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_scraped(&self) {
        self.items_scraped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::SeqCst);
    }

    /// An item was lost to a pipeline error or to a missing pipeline.
    pub(crate) fn increment_items_dropped(&self) {
        self.items_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_errors_reported(&self) {
        self.errors_reported.fetch_add(1, Ordering::SeqCst);
    }

    pub fn to_json_string(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
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

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {:?}", snapshot.elapsed)?;
        writeln!(
            f,
            "  speed    : req/s: {:.2}, resp/s: {:.2}, item/s: {:.2}",
            snapshot.per_second(snapshot.downloads_sent),
            snapshot.per_second(snapshot.responses_received),
            snapshot.per_second(snapshot.items_scraped)
        )?;
        writeln!(
            f,
            "  requests : enqueued: {}, rejected: {}, retried: {}, dropped: {}",
            snapshot.requests_enqueued,
            snapshot.requests_rejected,
            snapshot.requests_retried,
            snapshot.requests_dropped
        )?;
        writeln!(
            f,
            "  download : sent: {}, ok: {}, fail: {}, bytes: {}",
            snapshot.downloads_sent,
            snapshot.downloads_succeeded,
            snapshot.downloads_failed,
            snapshot.formatted_bytes()
        )?;
        writeln!(
            f,
            "  response : received: {}, retried: {}",
            snapshot.responses_received, snapshot.responses_retried
        )?;
        writeln!(
            f,
            "  items    : scraped: {}, processed: {}, dropped: {}",
            snapshot.items_scraped, snapshot.items_processed, snapshot.items_dropped
        )?;
        writeln!(f, "  errors   : {}", snapshot.errors_reported)?;

        let status_string = if snapshot.response_status_counts.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .response_status_counts
                .iter()
                .map(|(code, count)| format!("{}: {}", code, count))
                .collect::<Vec<String>>()
                .join(", ")
        };

        writeln!(f, "  status   : {}\n", status_string)
    }
}
