//! The download pump.
//!
//! Takes requests out of the request pool, hands each one to the least
//! loaded downloader and forwards the response into the response pool.
//! Failed requests are re-queued until they run out of retries.

use super::Scheduler;
use crate::buffer::BufferPool;
use crate::data::Request;
use crate::module::ModuleType;
use crate::state::Activity;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

pub(super) const IDLE_POLL: Duration = Duration::from_millis(20);

pub(crate) async fn run_download_loop(
    scheduler: Arc<Scheduler>,
    pool: Arc<BufferPool<Request>>,
    token: CancellationToken,
) {
    trace!("Download pump started");
    let mut tasks = JoinSet::new();

    loop {
        while let Some(res) = tasks.try_join_next() {
            if let Err(e) = res {
                error!("A download task failed: {:?}", e);
            }
        }
        if token.is_cancelled() {
            break;
        }
        if pool.total() == 0 {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(IDLE_POLL) => continue,
            }
        }

        let activity = scheduler.state().track(Activity::Download);
        let request = tokio::select! {
            _ = token.cancelled() => break,
            result = pool.get() => match result {
                Ok(request) => request,
                Err(_) => {
                    trace!("Request pool closed, exiting download pump");
                    break;
                }
            }
        };

        let scheduler = Arc::clone(&scheduler);
        tasks.spawn(async move {
            let _activity = activity;
            download_one(&scheduler, request).await;
        });
    }

    trace!("Waiting for active download tasks to complete");
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!("A download task failed: {:?}", e);
        }
    }
    trace!("Download pump finished");
}

async fn download_one(scheduler: &Scheduler, request: Request) {
    let module = match scheduler.resolve(ModuleType::Downloader) {
        Ok(module) => module,
        Err(e) => {
            scheduler.send_error(anyhow::Error::new(e), None);
            scheduler.requeue_request(request);
            return;
        }
    };
    let Some(downloader) = module.as_downloader() else {
        scheduler.send_error(
            anyhow::anyhow!("module {} is not a downloader", module.id()),
            None,
        );
        scheduler.requeue_request(request);
        return;
    };

    let stats = scheduler.stats();
    stats.increment_downloads_sent();
    trace!("Downloading {} with {}", request.url, module.id());
    match downloader.download(&request).await {
        Ok(response) => {
            stats.increment_downloads_succeeded();
            stats.record_response(response.status.as_u16(), response.body.len());
            scheduler.send_response(response);
        }
        Err(e) => {
            stats.increment_downloads_failed();
            scheduler.send_error(e, Some(module.id()));
            scheduler.requeue_request(request);
        }
    }
}
