use super::{DataArgs, ModuleArgsSummary, RequestArgs, Status};
use crate::buffer::BufferPoolSummary;
use crate::error::SpiderError;
use crate::module::ModuleSummary;
use serde::Serialize;
use std::fmt;

/// Everything the scheduler can report about itself at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSummary {
    pub request_args: RequestArgs,
    pub data_args: DataArgs,
    pub module_args: ModuleArgsSummary,
    pub status: Status,
    pub downloaders: Vec<ModuleSummary>,
    pub analyzers: Vec<ModuleSummary>,
    pub pipelines: Vec<ModuleSummary>,
    pub request_buffer_pool: BufferPoolSummary,
    pub response_buffer_pool: BufferPoolSummary,
    pub item_buffer_pool: BufferPoolSummary,
    pub error_buffer_pool: BufferPoolSummary,
    pub num_url: u64,
}

impl SchedulerSummary {
    /// Compares configuration, status, module identities, pool sizing and URL
    /// count, ignoring the module call counters.
    pub fn same(&self, other: &SchedulerSummary) -> bool {
        fn ids(modules: &[ModuleSummary]) -> Vec<&str> {
            modules.iter().map(|m| m.id.as_str()).collect()
        }

        self.request_args == other.request_args
            && self.data_args == other.data_args
            && self.module_args == other.module_args
            && self.status == other.status
            && ids(&self.downloaders) == ids(&other.downloaders)
            && ids(&self.analyzers) == ids(&other.analyzers)
            && ids(&self.pipelines) == ids(&other.pipelines)
            && self.request_buffer_pool == other.request_buffer_pool
            && self.response_buffer_pool == other.response_buffer_pool
            && self.item_buffer_pool == other.item_buffer_pool
            && self.error_buffer_pool == other.error_buffer_pool
            && self.num_url == other.num_url
    }

    pub fn to_json_string(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SchedulerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = self.to_json_string_pretty().map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
