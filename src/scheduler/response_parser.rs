//! The analyze pump: responses in, follow-up requests and items out.

use super::request_handler::IDLE_POLL;
use super::Scheduler;
use crate::buffer::BufferPool;
use crate::data::{ParsedData, Response};
use crate::module::ModuleType;
use crate::state::Activity;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

pub(crate) async fn run_analyze_loop(
    scheduler: Arc<Scheduler>,
    pool: Arc<BufferPool<Response>>,
    token: CancellationToken,
) {
    trace!("Analyze pump started");
    let mut tasks = JoinSet::new();

    loop {
        while let Some(res) = tasks.try_join_next() {
            if let Err(e) = res {
                error!("An analyze task failed: {:?}", e);
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

        let activity = scheduler.state().track(Activity::Parse);
        let response = tokio::select! {
            _ = token.cancelled() => break,
            result = pool.get() => match result {
                Ok(response) => response,
                Err(_) => {
                    trace!("Response pool closed, exiting analyze pump");
                    break;
                }
            }
        };

        let scheduler = Arc::clone(&scheduler);
        tasks.spawn(async move {
            let _activity = activity;
            analyze_one(&scheduler, response);
        });
    }

    trace!("Waiting for active analyze tasks to complete");
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!("An analyze task failed: {:?}", e);
        }
    }
    trace!("Analyze pump finished");
}

fn analyze_one(scheduler: &Scheduler, response: Response) {
    let module = match scheduler.resolve(ModuleType::Analyzer) {
        Ok(module) => module,
        Err(e) => {
            scheduler.send_error(anyhow::Error::new(e), None);
            scheduler.requeue_response(response);
            return;
        }
    };
    let Some(analyzer) = module.as_analyzer() else {
        scheduler.send_error(
            anyhow::anyhow!("module {} is not an analyzer", module.id()),
            None,
        );
        scheduler.requeue_response(response);
        return;
    };

    trace!("Analyzing {} with {}", response.url, module.id());
    let (data_list, errors) = analyzer.analyze(&response);
    debug!(
        "Parsed {} ({} outputs, {} errors)",
        response.url,
        data_list.len(),
        errors.len()
    );

    let stats = scheduler.stats();
    for data in data_list {
        match data {
            ParsedData::Request(request) => {
                scheduler.send_request(request);
            }
            ParsedData::Item(item) => {
                stats.increment_items_scraped();
                scheduler.send_item(item);
            }
        }
    }
    for err in errors {
        scheduler.send_error(err, Some(module.id()));
    }
}
