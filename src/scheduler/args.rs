use crate::error::SpiderError;
use crate::module::Module;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

fn default_max_retries() -> u32 {
    3
}

/// Which requests the crawl accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestArgs {
    #[serde(rename = "accepted_primary_domains")]
    pub accepted_domains: Vec<String>,
    pub max_depth: u32,
    /// How often a failed request or response may be re-queued.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl RequestArgs {
    pub fn new<I, S>(accepted_domains: I, max_depth: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepted_domains: accepted_domains.into_iter().map(Into::into).collect(),
            max_depth,
            max_retries: default_max_retries(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn check(&self) -> Result<(), SpiderError> {
        if self.accepted_domains.is_empty() {
            return Err(SpiderError::illegal("empty accepted primary domain list"));
        }
        Ok(())
    }
}

/// Sizing of one buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolArgs {
    pub buffer_cap: u32,
    pub max_buffer_number: u32,
}

impl PoolArgs {
    pub const fn new(buffer_cap: u32, max_buffer_number: u32) -> Self {
        Self {
            buffer_cap,
            max_buffer_number,
        }
    }

    fn check(&self, name: &str) -> Result<(), SpiderError> {
        if self.buffer_cap == 0 {
            return Err(SpiderError::illegal(format!("zero {} buffer capacity", name)));
        }
        if self.max_buffer_number == 0 {
            return Err(SpiderError::illegal(format!("zero max {} buffer number", name)));
        }
        Ok(())
    }
}

/// Sizing of the four buffer pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataArgs {
    pub request: PoolArgs,
    pub response: PoolArgs,
    pub item: PoolArgs,
    pub error: PoolArgs,
}

impl DataArgs {
    /// The same sizing for all four pools.
    pub const fn uniform(buffer_cap: u32, max_buffer_number: u32) -> Self {
        let pool = PoolArgs::new(buffer_cap, max_buffer_number);
        Self {
            request: pool,
            response: pool,
            item: pool,
            error: pool,
        }
    }

    pub fn check(&self) -> Result<(), SpiderError> {
        self.request.check("request")?;
        self.response.check("response")?;
        self.item.check("item")?;
        self.error.check("error")
    }
}

impl Default for DataArgs {
    fn default() -> Self {
        Self {
            request: PoolArgs::new(55, 1000),
            response: PoolArgs::new(50, 10),
            item: PoolArgs::new(50, 100),
            error: PoolArgs::new(50, 1),
        }
    }
}

/// The module instances to register on init.
#[derive(Clone, Default)]
pub struct ModuleArgs {
    pub downloaders: Vec<Arc<dyn Module>>,
    pub analyzers: Vec<Arc<dyn Module>>,
    pub pipelines: Vec<Arc<dyn Module>>,
}

impl ModuleArgs {
    pub fn new(
        downloaders: Vec<Arc<dyn Module>>,
        analyzers: Vec<Arc<dyn Module>>,
        pipelines: Vec<Arc<dyn Module>>,
    ) -> Self {
        Self {
            downloaders,
            analyzers,
            pipelines,
        }
    }

    pub fn check(&self) -> Result<(), SpiderError> {
        if self.downloaders.is_empty() {
            return Err(SpiderError::illegal("empty downloader list"));
        }
        if self.analyzers.is_empty() {
            return Err(SpiderError::illegal("empty analyzer list"));
        }
        if self.pipelines.is_empty() {
            return Err(SpiderError::illegal("empty pipeline list"));
        }
        Ok(())
    }

    pub fn summary(&self) -> ModuleArgsSummary {
        ModuleArgsSummary {
            downloader_list_size: self.downloaders.len(),
            analyzer_list_size: self.analyzers.len(),
            pipeline_list_size: self.pipelines.len(),
        }
    }
}

impl fmt::Debug for ModuleArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn ids(modules: &[Arc<dyn Module>]) -> Vec<String> {
            modules.iter().map(|m| m.id().to_string()).collect()
        }
        f.debug_struct("ModuleArgs")
            .field("downloaders", &ids(&self.downloaders))
            .field("analyzers", &ids(&self.analyzers))
            .field("pipelines", &ids(&self.pipelines))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModuleArgsSummary {
    pub downloader_list_size: usize,
    pub analyzer_list_size: usize,
    pub pipeline_list_size: usize,
}
