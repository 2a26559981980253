//! The `Crawler` driver.
//!
//! Runs one crawl on top of a [`Scheduler`]: initialize it, start it from a
//! first request, log every asynchronous error, wait until the scheduler has
//! been idle for a number of consecutive checks (or Ctrl-C arrives), then stop
//! it and report the final summary.

use crate::data::Request;
use crate::error::SpiderError;
use crate::scheduler::{
    primary_domain, DataArgs, ModuleArgs, RequestArgs, Scheduler, SchedulerSummary,
};
use crate::stats::StatCollector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Drives a single [`Scheduler`] through a complete crawl.
#[derive(Debug)]
pub struct Crawler {
    scheduler: Arc<Scheduler>,
    request_args: RequestArgs,
    data_args: DataArgs,
    module_args: ModuleArgs,
    max_idle_count: u32,
    idle_interval: Duration,
}

impl Crawler {
    pub(crate) fn new(
        request_args: RequestArgs,
        data_args: DataArgs,
        module_args: ModuleArgs,
        max_idle_count: u32,
        idle_interval: Duration,
    ) -> Self {
        Crawler {
            scheduler: Scheduler::new(),
            request_args,
            data_args,
            module_args,
            max_idle_count: max_idle_count.max(1),
            idle_interval,
        }
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn module_args(&self) -> &ModuleArgs {
        &self.module_args
    }

    /// Returns the `StatCollector` of the underlying scheduler.
    ///
    /// This allows programmatic access to the collected statistics at any time
    /// during or after the crawl.
    pub fn stats(&self) -> Arc<StatCollector> {
        self.scheduler.stats()
    }

    /// Crawls from `first_request` until the scheduler goes idle or Ctrl-C is
    /// received, then stops the scheduler and returns its summary.
    pub async fn crawl(&self, first_request: Request) -> Result<SchedulerSummary, SpiderError> {
        info!(
            "Crawler starting crawl from {} with max depth {}",
            first_request.url, self.request_args.max_depth
        );

        // With no configured domains, the crawl stays on the first
        // request's primary domain.
        let mut request_args = self.request_args.clone();
        if request_args.accepted_domains.is_empty() {
            let host = first_request.url.host_str().ok_or_else(|| {
                SpiderError::illegal(format!("first request has no host: {}", first_request.url))
            })?;
            request_args.accepted_domains.push(primary_domain(host)?);
        }

        self.scheduler.init(
            request_args,
            self.data_args,
            self.module_args.clone(),
        )?;

        let errors = self.scheduler.error_chan()?;
        let error_task = tokio::spawn(async move {
            let mut count = 0usize;
            while let Ok(err) = errors.recv().await {
                count += 1;
                error!("{}", err);
            }
            trace!("Error channel closed after {} errors", count);
        });

        self.scheduler.start(first_request)?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, initiating graceful shutdown.");
            }
            _ = self.wait_idle() => {
                info!("Crawl has become idle, initiating shutdown.");
            }
        };

        self.scheduler.stop().await?;
        if let Err(e) = error_task.await {
            error!("Error forwarding task failed: {}", e);
        }

        let summary = self.scheduler.summary();
        info!("Crawl finished. {}", self.scheduler.stats());
        debug!("Scheduler summary: {}", summary);
        Ok(summary)
    }

    /// Resolves once `idle()` has held for `max_idle_count` checks in a row.
    async fn wait_idle(&self) {
        let mut idle_count = 0u32;
        loop {
            tokio::time::sleep(self.idle_interval).await;
            if self.scheduler.idle() {
                idle_count += 1;
                trace!("Scheduler idle check {}/{}", idle_count, self.max_idle_count);
                if idle_count >= self.max_idle_count {
                    return;
                }
            } else {
                idle_count = 0;
            }
        }
    }
}
