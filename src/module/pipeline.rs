use super::{sn, Mid, Module, ModuleBase, ModuleSummary, ModuleType, Pipeline, ProcessItem, ScoreCalculator};
use crate::data::Item;
use crate::error::SpiderError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Serialize)]
struct PipelineExtra {
    fail_fast: bool,
    processor_number: usize,
}

/// A pipeline passing each item through a fixed list of processors.
pub struct ProcessorPipeline {
    base: ModuleBase,
    processors: Vec<ProcessItem>,
    fail_fast: AtomicBool,
}

impl ProcessorPipeline {
    pub fn new(
        mid: Mid,
        processors: Vec<ProcessItem>,
        calculator: ScoreCalculator,
    ) -> Result<Self, SpiderError> {
        if mid.module_type() != ModuleType::Pipeline {
            return Err(SpiderError::IncorrectModuleType {
                mid,
                module_type: ModuleType::Pipeline,
            });
        }
        if processors.is_empty() {
            return Err(SpiderError::illegal("empty item processor list"));
        }
        Ok(Self {
            base: ModuleBase::with_calculator(mid, calculator),
            processors,
            fail_fast: AtomicBool::new(false),
        })
    }
}

impl Module for ProcessorPipeline {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn summary(&self) -> ModuleSummary {
        let mut summary = self.base.summary();
        let extra = PipelineExtra {
            fail_fast: self.fail_fast(),
            processor_number: self.processors.len(),
        };
        summary.extra = serde_json::to_value(extra).ok();
        summary
    }

    fn as_pipeline(&self) -> Option<&dyn Pipeline> {
        Some(self)
    }
}

impl Pipeline for ProcessorPipeline {
    fn item_processors(&self) -> Vec<ProcessItem> {
        self.processors.clone()
    }

    fn send(&self, item: Item) -> Vec<anyhow::Error> {
        let _handling = self.base.begin_handling();
        self.base.incr_called_count();
        self.base.incr_accepted_count();

        trace!("[Pipeline] --> Process item {:?}", item);
        let fail_fast = self.fail_fast();
        let mut errors = Vec::new();
        let mut current = item;
        for processor in &self.processors {
            match processor(current.clone()) {
                Ok(Some(next)) => current = next,
                Ok(None) => {
                    trace!("[Pipeline] --> Item dropped by processor");
                    break;
                }
                Err(e) => {
                    errors.push(e);
                    if fail_fast {
                        break;
                    }
                }
            }
        }

        if errors.is_empty() {
            self.base.incr_completed_count();
        }
        errors
    }

    fn fail_fast(&self) -> bool {
        self.fail_fast.load(Ordering::SeqCst)
    }

    fn set_fail_fast(&self, fail_fast: bool) {
        self.fail_fast.store(fail_fast, Ordering::SeqCst);
    }
}

/// Creates `number` fail-fast pipelines sharing `processors`, with serials
/// from the global generator.
pub fn pipelines(
    number: u32,
    processors: Vec<ProcessItem>,
) -> Result<Vec<Arc<dyn Module>>, SpiderError> {
    let mut modules: Vec<Arc<dyn Module>> = Vec::with_capacity(number as usize);
    for _ in 0..number {
        let mid = Mid::new(ModuleType::Pipeline, sn::global().get(), None);
        let pipeline = ProcessorPipeline::new(mid, processors.clone(), super::calculate_score_simple)?;
        pipeline.set_fail_fast(true);
        modules.push(Arc::new(pipeline));
    }
    Ok(modules)
}
