use super::item_processor::run_pick_loop;
use super::request_handler::{run_download_loop, IDLE_POLL};
use super::response_parser::run_analyze_loop;
use super::status::check_status;
use super::{primary_domain, DataArgs, ModuleArgs, ModuleArgsSummary, RequestArgs, SchedulerSummary, Status};
use crate::buffer::{BufferPool, BufferPoolSummary};
use crate::data::{Item, Request, Response};
use crate::error::{CrawlerError, SpiderError};
use crate::module::{Mid, Module, ModuleSummary, ModuleType, Registry};
use crate::state::{Activity, ActivityGuard, CrawlerState};
use crate::stats::StatCollector;
use dashmap::DashSet;
use kanal::AsyncReceiver;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// The four pools of one crawl session.
#[derive(Clone)]
pub(crate) struct Pools {
    pub(crate) request: Arc<BufferPool<Request>>,
    pub(crate) response: Arc<BufferPool<Response>>,
    pub(crate) item: Arc<BufferPool<Item>>,
    pub(crate) error: Arc<BufferPool<CrawlerError>>,
}

impl Pools {
    fn new(args: &DataArgs) -> Result<Self, SpiderError> {
        Ok(Self {
            request: Arc::new(BufferPool::new(args.request.buffer_cap, args.request.max_buffer_number, "request")?),
            response: Arc::new(BufferPool::new(args.response.buffer_cap, args.response.max_buffer_number, "response")?),
            item: Arc::new(BufferPool::new(args.item.buffer_cap, args.item.max_buffer_number, "item")?),
            error: Arc::new(BufferPool::new(args.error.buffer_cap, args.error.max_buffer_number, "error")?),
        })
    }

    /// Replaces every closed pool with a fresh one of the same sizing.
    fn reopen(&self) -> Result<Self, SpiderError> {
        fn fresh<T: Send + 'static>(pool: &Arc<BufferPool<T>>) -> Result<Arc<BufferPool<T>>, SpiderError> {
            if !pool.closed() {
                return Ok(Arc::clone(pool));
            }
            debug!("[Scheduler] --> reopening {} buffer pool", pool.name());
            Ok(Arc::new(BufferPool::new(
                pool.buffer_cap(),
                pool.max_buffer_number(),
                pool.name().to_string(),
            )?))
        }

        Ok(Self {
            request: fresh(&self.request)?,
            response: fresh(&self.response)?,
            item: fresh(&self.item)?,
            error: fresh(&self.error)?,
        })
    }

    fn close(&self) {
        for (name, closed) in [
            ("request", self.request.close()),
            ("response", self.response.close()),
            ("item", self.item.close()),
            ("error", self.error.close()),
        ] {
            if !closed {
                debug!("[Scheduler] --> {} buffer pool was already closed", name);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Settings {
    request_args: RequestArgs,
    data_args: DataArgs,
    module_args: ModuleArgsSummary,
}

/// Drives requests, responses and items through the downloader, analyzer
/// and pipeline modules.
///
/// A scheduler is created once and may be initialized, started and stopped
/// repeatedly following the [`Status`] rules. While started it runs three
/// pump tasks, one per stage, that move payloads between four buffer pools.
pub struct Scheduler {
    status: Mutex<Status>,
    registry: Registry,
    settings: RwLock<Settings>,
    accepted_domains: DashSet<String>,
    seen_urls: DashSet<String>,
    pools: RwLock<Option<Pools>>,
    token: RwLock<CancellationToken>,
    tasks: Mutex<JoinSet<()>>,
    state: Arc<CrawlerState>,
    stats: Arc<StatCollector>,
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(Status::Uninitialized),
            registry: Registry::new(),
            settings: RwLock::new(Settings::default()),
            accepted_domains: DashSet::new(),
            seen_urls: DashSet::new(),
            pools: RwLock::new(None),
            token: RwLock::new(CancellationToken::new()),
            tasks: Mutex::new(JoinSet::new()),
            state: CrawlerState::new(),
            stats: Arc::new(StatCollector::new()),
        })
    }

    fn check_and_set_status(&self, wanted: Status) -> Result<Status, SpiderError> {
        let mut status = self.status.lock();
        let old = *status;
        check_status(old, wanted)?;
        *status = wanted;
        Ok(old)
    }

    fn finish_transition<T>(&self, old: Status, done: Status, result: &Result<T, SpiderError>) {
        let mut status = self.status.lock();
        *status = if result.is_ok() { done } else { old };
    }

    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    /// Validates the arguments and builds a fresh crawl session: new
    /// registry contents, domain and URL sets, buffer pools and
    /// cancellation token.
    ///
    /// On failure the status is left as it was before the call.
    pub fn init(
        &self,
        request_args: RequestArgs,
        data_args: DataArgs,
        module_args: ModuleArgs,
    ) -> Result<(), SpiderError> {
        info!("[Scheduler] --> Check status for initialization");
        let old = self.check_and_set_status(Status::Initializing)?;
        let result = self.init_session(request_args, data_args, module_args);
        self.finish_transition(old, Status::Initialized, &result);
        match &result {
            Ok(()) => info!("[Scheduler] --> Scheduler has been initialized"),
            Err(e) => error!("[Scheduler] --> Initialization failed: {}", e),
        }
        result
    }

    fn init_session(
        &self,
        request_args: RequestArgs,
        data_args: DataArgs,
        module_args: ModuleArgs,
    ) -> Result<(), SpiderError> {
        info!("[Scheduler] --> Check request arguments");
        request_args.check()?;
        info!("[Scheduler] --> Check data arguments");
        data_args.check()?;
        info!("[Scheduler] --> Check module arguments");
        module_args.check()?;

        self.registry.clear();

        self.accepted_domains.clear();
        for domain in &request_args.accepted_domains {
            self.accepted_domains.insert(domain.trim().to_ascii_lowercase());
        }
        self.seen_urls.clear();
        info!(
            "[Scheduler] --> max depth: {}, accepted primary domains: {:?}",
            request_args.max_depth, request_args.accepted_domains
        );

        {
            let mut pools = self.pools.write();
            if let Some(old) = pools.take() {
                old.close();
            }
            *pools = Some(Pools::new(&data_args)?);
        }
        self.reset_token();

        *self.settings.write() = Settings {
            request_args,
            data_args,
            module_args: module_args.summary(),
        };

        self.register_modules(&module_args)?;
        info!(
            "[Scheduler] --> The number of registered modules: {}",
            self.registry.len()
        );
        Ok(())
    }

    fn register_modules(&self, args: &ModuleArgs) -> Result<(), SpiderError> {
        for (module_type, modules) in [
            (ModuleType::Downloader, &args.downloaders),
            (ModuleType::Analyzer, &args.analyzers),
            (ModuleType::Pipeline, &args.pipelines),
        ] {
            for module in modules {
                if module.id().module_type() != module_type {
                    return Err(SpiderError::IncorrectModuleType {
                        mid: module.id().clone(),
                        module_type,
                    });
                }
                if !self.registry.register(Arc::clone(module))? {
                    return Err(SpiderError::scheduler(format!(
                        "couldn't register {} instance with MID {}",
                        module_type,
                        module.id()
                    )));
                }
            }
            info!(
                "[Scheduler] --> All {}s have been registered (number: {})",
                module_type,
                modules.len()
            );
        }
        Ok(())
    }

    fn reset_token(&self) {
        *self.token.write() = CancellationToken::new();
        trace!("[Scheduler] --> cancellation token reset");
    }

    fn token(&self) -> CancellationToken {
        self.token.read().clone()
    }

    fn canceled(&self) -> bool {
        self.token.read().is_cancelled()
    }

    pub(crate) fn pools(&self) -> Option<Pools> {
        self.pools.read().clone()
    }

    /// Starts crawling from `first_request`.
    ///
    /// The primary domain of the first request is added to the accepted
    /// domains, closed pools are reopened and the three pumps are spawned.
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>, first_request: Request) -> Result<(), SpiderError> {
        info!("[Scheduler] --> Start scheduler...");
        let old = self.check_and_set_status(Status::Starting)?;
        let result = self.start_session(first_request);
        self.finish_transition(old, Status::Started, &result);
        match &result {
            Ok(()) => info!("[Scheduler] --> Scheduler has been started"),
            Err(e) => error!("[Scheduler] --> Start failed: {}", e),
        }
        result
    }

    fn start_session(self: &Arc<Self>, first_request: Request) -> Result<(), SpiderError> {
        let host = first_request
            .url
            .host_str()
            .ok_or_else(|| SpiderError::illegal(format!("first request has no host: {}", first_request.url)))?;
        let domain = primary_domain(host)?;
        info!("[Scheduler] --> Primary domain of the first request: {}", domain);
        self.accepted_domains.insert(domain);

        let pools = {
            let mut guard = self.pools.write();
            let current = guard
                .as_ref()
                .ok_or_else(|| SpiderError::scheduler("buffer pools are not initialized"))?;
            let reopened = current.reopen()?;
            *guard = Some(reopened.clone());
            reopened
        };

        if self.canceled() {
            self.reset_token();
        }
        let token = self.token();

        {
            let mut tasks = self.tasks.lock();
            tasks.spawn(run_download_loop(Arc::clone(self), Arc::clone(&pools.request), token.clone()));
            tasks.spawn(run_analyze_loop(Arc::clone(self), Arc::clone(&pools.response), token.clone()));
            tasks.spawn(run_pick_loop(Arc::clone(self), Arc::clone(&pools.item), token));
        }

        debug!("[Scheduler] --> Send the first request: {}", first_request);
        if !self.send_request(first_request) {
            warn!("[Scheduler] --> The first request was not accepted");
        }
        Ok(())
    }

    /// Cancels the pumps, closes all four pools and waits for the pumps to
    /// finish.
    pub async fn stop(&self) -> Result<(), SpiderError> {
        info!("[Scheduler] --> Stop scheduler...");
        self.check_and_set_status(Status::Stopping)?;

        self.token.read().cancel();
        if let Some(pools) = self.pools() {
            pools.close();
        }

        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let joined = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("[Scheduler] --> Pump task failed during shutdown: {}", e);
                }
            }
        })
        .await;
        if joined.is_err() {
            warn!(
                "[Scheduler] --> Pumps did not finish within {}s, aborting them",
                SHUTDOWN_TIMEOUT.as_secs()
            );
            tasks.abort_all();
        }

        *self.status.lock() = Status::Stopped;
        info!("[Scheduler] --> Scheduler has been stopped");
        Ok(())
    }

    /// Errors reported by the pumps and modules.
    ///
    /// A background task moves errors from the error pool into the returned
    /// channel until the scheduler is stopped, then closes it. Must be called
    /// after `init` and from within a tokio runtime.
    pub fn error_chan(&self) -> Result<AsyncReceiver<CrawlerError>, SpiderError> {
        let pools = self
            .pools()
            .ok_or_else(|| SpiderError::scheduler("buffer pools are not initialized"))?;
        let pool = pools.error;
        let token = self.token();
        let (tx, rx) = kanal::bounded_async(pool.buffer_cap() as usize);

        tokio::spawn(async move {
            loop {
                if pool.total() == 0 {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!("[Scheduler] --> scheduler stopped, closing error channel");
                            break;
                        }
                        _ = tokio::time::sleep(IDLE_POLL) => continue,
                    }
                }
                let err = tokio::select! {
                    _ = token.cancelled() => {
                        debug!("[Scheduler] --> scheduler stopped, closing error channel");
                        break;
                    }
                    result = pool.get() => match result {
                        Ok(err) => err,
                        Err(_) => {
                            debug!("[Scheduler] --> error buffer pool closed, closing error channel");
                            break;
                        }
                    }
                };
                if tx.send(err).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    /// True when no module is handling a call, the request, response and item
    /// pools are empty, and nothing is in transit between them.
    pub fn idle(&self) -> bool {
        let busy = self
            .registry
            .get_all()
            .values()
            .any(|module| module.counts().handling > 0);
        if busy {
            return false;
        }
        if let Some(pools) = self.pools() {
            if pools.request.total() > 0 || pools.response.total() > 0 || pools.item.total() > 0 {
                return false;
            }
        }
        self.state.is_idle()
    }

    pub fn summary(&self) -> SchedulerSummary {
        let settings = self.settings.read().clone();
        let (request_pool, response_pool, item_pool, error_pool): (
            BufferPoolSummary,
            BufferPoolSummary,
            BufferPoolSummary,
            BufferPoolSummary,
        ) = match self.pools() {
            Some(pools) => (
                pools.request.summary(),
                pools.response.summary(),
                pools.item.summary(),
                pools.error.summary(),
            ),
            None => Default::default(),
        };

        SchedulerSummary {
            request_args: settings.request_args,
            data_args: settings.data_args,
            module_args: settings.module_args,
            status: self.status(),
            downloaders: self.module_summaries(ModuleType::Downloader),
            analyzers: self.module_summaries(ModuleType::Analyzer),
            pipelines: self.module_summaries(ModuleType::Pipeline),
            request_buffer_pool: request_pool,
            response_buffer_pool: response_pool,
            item_buffer_pool: item_pool,
            error_buffer_pool: error_pool,
            num_url: self.seen_urls.len() as u64,
        }
    }

    fn module_summaries(&self, module_type: ModuleType) -> Vec<ModuleSummary> {
        let mut summaries: Vec<ModuleSummary> = self
            .registry
            .get_all_by_type(module_type)
            .map(|modules| modules.values().map(|m| m.summary()).collect())
            .unwrap_or_default();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    pub(crate) fn state(&self) -> &Arc<CrawlerState> {
        &self.state
    }

    fn max_retries(&self) -> u32 {
        self.settings.read().request_args.max_retries
    }

    /// Puts `data` into `pool` from a background task, counted as in-transit
    /// work until it lands.
    fn spawn_put<T: Send + 'static>(&self, pool: Arc<BufferPool<T>>, data: T) {
        let pending = self.state.track(Activity::Send);
        put_in_background(pool, data, Some(pending));
    }

    /// Tags `err` with the stage it came from and queues it for
    /// [`Scheduler::error_chan`].
    ///
    /// The put is not counted as in-transit work: an error channel nobody
    /// drains must not keep the crawl from going idle.
    pub(crate) fn send_error(&self, err: anyhow::Error, mid: Option<&Mid>) -> bool {
        let crawler_error = CrawlerError::classify(err, mid);
        trace!("[Scheduler] --> {}", crawler_error);
        self.stats.increment_errors_reported();
        let Some(pools) = self.pools() else {
            return false;
        };
        if pools.error.closed() {
            return false;
        }
        put_in_background(pools.error, crawler_error, None);
        true
    }

    /// Queues `request` for download if it passes every filter.
    ///
    /// Rejected: after stop, when the request pool is closed, when the scheme
    /// is not http or https, when the primary domain is not accepted, when
    /// the depth exceeds the maximum, and when the URL was already queued.
    pub fn send_request(&self, request: Request) -> bool {
        if self.canceled() {
            return false;
        }
        let Some(pools) = self.pools() else {
            return false;
        };
        if pools.request.closed() {
            return false;
        }

        if let Err(reason) = self.filter_request(&request) {
            debug!("[Scheduler] --> Ignore the request! {} (URL: {})", reason, request.url);
            self.stats.increment_requests_rejected();
            return false;
        }

        if !self.seen_urls.insert(request.fingerprint()) {
            debug!("[Scheduler] --> Ignore the request! Its URL is repeated. (URL: {})", request.url);
            self.stats.increment_requests_rejected();
            return false;
        }

        trace!("[Scheduler] --> Enqueue {}", request);
        self.stats.increment_requests_enqueued();
        self.spawn_put(pools.request, request);
        true
    }

    fn filter_request(&self, request: &Request) -> Result<(), String> {
        let scheme = request.url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(format!("Its URL scheme is {:?}, but should be \"http\" or \"https\".", scheme));
        }

        let host = request
            .url
            .host_str()
            .ok_or_else(|| "Its URL has no host.".to_string())?;
        match primary_domain(host) {
            Ok(domain) if self.accepted_domains.contains(&domain) => {}
            _ => return Err(format!("Its host {:?} is not in the accepted primary domains.", host)),
        }

        let max_depth = self.settings.read().request_args.max_depth;
        if request.depth() > max_depth {
            return Err(format!("Its depth {} is greater than {}.", request.depth(), max_depth));
        }
        Ok(())
    }

    /// Puts a request that failed back into the request pool, unless it has
    /// used up its retries.
    pub(crate) fn requeue_request(&self, mut request: Request) -> bool {
        if request.retries() >= self.max_retries() {
            debug!("[Scheduler] --> Giving up on {} after {} retries", request.url, request.retries());
            self.stats.increment_requests_dropped();
            return false;
        }
        if self.canceled() {
            return false;
        }
        let Some(pools) = self.pools() else {
            return false;
        };
        if pools.request.closed() {
            return false;
        }
        request.bump_retries();
        self.stats.increment_requests_retried();
        self.spawn_put(pools.request, request);
        true
    }

    pub fn send_response(&self, response: Response) -> bool {
        let Some(pools) = self.pools() else {
            return false;
        };
        if pools.response.closed() {
            return false;
        }
        self.spawn_put(pools.response, response);
        true
    }

    pub(crate) fn requeue_response(&self, mut response: Response) -> bool {
        if response.retries() >= self.max_retries() {
            debug!("[Scheduler] --> Giving up on the response of {}", response.url);
            return false;
        }
        if self.canceled() {
            return false;
        }
        response.bump_retries();
        self.stats.increment_responses_retried();
        self.send_response(response)
    }

    pub fn send_item(&self, item: Item) -> bool {
        let Some(pools) = self.pools() else {
            return false;
        };
        if pools.item.closed() {
            return false;
        }
        self.spawn_put(pools.item, item);
        true
    }

    pub(crate) fn resolve(&self, module_type: ModuleType) -> Result<Arc<dyn Module>, SpiderError> {
        self.registry.get(module_type)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("status", &self.status())
            .field("registry", &self.registry)
            .field("num_url", &self.seen_urls.len())
            .finish()
    }
}

/// Puts `data` into `pool` from a background task. `pending` is released once
/// the put lands or the pool turns out to be closed.
fn put_in_background<T: Send + 'static>(
    pool: Arc<BufferPool<T>>,
    data: T,
    pending: Option<ActivityGuard>,
) {
    tokio::spawn(async move {
        let _pending = pending;
        if let Err(e) = pool.put(data).await {
            debug!(
                "[Scheduler] --> The {} buffer pool was closed, ignoring send: {}",
                pool.name(),
                e
            );
        }
    });
}
