//! The pick pump: items are sent through the least loaded pipeline.

use super::request_handler::IDLE_POLL;
use super::Scheduler;
use crate::buffer::BufferPool;
use crate::data::Item;
use crate::module::ModuleType;
use crate::state::Activity;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

pub(crate) async fn run_pick_loop(
    scheduler: Arc<Scheduler>,
    pool: Arc<BufferPool<Item>>,
    token: CancellationToken,
) {
    trace!("Pick pump started");
    let mut tasks = JoinSet::new();

    loop {
        while let Some(res) = tasks.try_join_next() {
            if let Err(e) = res {
                error!("An item processing task failed: {:?}", e);
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

        let activity = scheduler.state().track(Activity::Process);
        let item = tokio::select! {
            _ = token.cancelled() => break,
            result = pool.get() => match result {
                Ok(item) => item,
                Err(_) => {
                    trace!("Item pool closed, exiting pick pump");
                    break;
                }
            }
        };

        let scheduler = Arc::clone(&scheduler);
        tasks.spawn(async move {
            let _activity = activity;
            pick_one(&scheduler, item);
        });
    }

    trace!("Waiting for active item processing tasks to complete");
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!("An item processing task failed: {:?}", e);
        }
    }
    trace!("Pick pump finished");
}

/// Items are never re-queued.
fn pick_one(scheduler: &Scheduler, item: Item) {
    let stats = scheduler.stats();
    let module = match scheduler.resolve(ModuleType::Pipeline) {
        Ok(module) => module,
        Err(e) => {
            stats.increment_items_dropped();
            scheduler.send_error(anyhow::Error::new(e), None);
            return;
        }
    };
    let Some(pipeline) = module.as_pipeline() else {
        stats.increment_items_dropped();
        scheduler.send_error(
            anyhow::anyhow!("module {} is not a pipeline", module.id()),
            None,
        );
        return;
    };

    trace!("Processing item with {}", module.id());
    let errors = pipeline.send(item);
    if errors.is_empty() {
        stats.increment_items_processed();
        return;
    }
    stats.increment_items_dropped();
    for err in errors {
        scheduler.send_error(err, Some(module.id()));
    }
}
