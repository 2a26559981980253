//! Worker modules and the registry that balances load across them.
//!
//! Every module carries a [`ModuleBase`] holding its [`Mid`] and four call
//! counters. The letter encoded in the MID decides which capability trait
//! ([`Downloader`], [`Analyzer`] or [`Pipeline`]) the module must implement
//! before the [`Registry`] accepts it.

mod analyzer;
mod base;
mod downloader;
mod mid;
mod pipeline;
mod registry;
pub mod sn;

pub use analyzer::{analyzers, ParserAnalyzer};
pub use base::{calculate_score_simple, set_score, Counts, HandlingGuard, ModuleBase, ModuleSummary, ScoreCalculator};
#[cfg(feature = "reqwest")]
pub use downloader::ReqwestFetcher;
pub use downloader::{downloaders, FetchDownloader};
pub use mid::{legal_mid, split_mid, Mid};
pub use pipeline::{pipelines, ProcessorPipeline};
pub use registry::Registry;
pub use sn::SnGenerator;

use crate::data::{Item, ParsedData, Request, Response};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three kinds of worker the scheduler drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Downloader,
    Analyzer,
    Pipeline,
}

impl ModuleType {
    pub const ALL: [ModuleType; 3] = [
        ModuleType::Downloader,
        ModuleType::Analyzer,
        ModuleType::Pipeline,
    ];

    pub fn letter(self) -> char {
        match self {
            ModuleType::Downloader => 'D',
            ModuleType::Analyzer => 'A',
            ModuleType::Pipeline => 'P',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'D' => Some(ModuleType::Downloader),
            'A' => Some(ModuleType::Analyzer),
            'P' => Some(ModuleType::Pipeline),
            _ => None,
        }
    }

    /// Whether `module` offers the capability this type stands for.
    pub fn is_implemented_by(self, module: &dyn Module) -> bool {
        match self {
            ModuleType::Downloader => module.as_downloader().is_some(),
            ModuleType::Analyzer => module.as_analyzer().is_some(),
            ModuleType::Pipeline => module.as_pipeline().is_some(),
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleType::Downloader => "downloader",
            ModuleType::Analyzer => "analyzer",
            ModuleType::Pipeline => "pipeline",
        };
        f.write_str(s)
    }
}

/// Common surface of every registered worker.
///
/// Implementors provide [`Module::base`] and override the `as_*` accessor
/// matching the capability they implement.
pub trait Module: Send + Sync + 'static {
    fn base(&self) -> &ModuleBase;

    fn id(&self) -> &Mid {
        self.base().id()
    }

    fn score(&self) -> u64 {
        self.base().score()
    }

    fn counts(&self) -> Counts {
        self.base().counts()
    }

    fn summary(&self) -> ModuleSummary {
        self.base().summary()
    }

    fn as_downloader(&self) -> Option<&dyn Downloader> {
        None
    }

    fn as_analyzer(&self) -> Option<&dyn Analyzer> {
        None
    }

    fn as_pipeline(&self) -> Option<&dyn Pipeline> {
        None
    }
}

/// Turns a request into a response.
#[async_trait]
pub trait Downloader: Module {
    async fn download(&self, request: &Request) -> anyhow::Result<Response>;
}

/// Extracts follow-up requests and items from a response.
pub trait Analyzer: Module {
    fn resp_parsers(&self) -> Vec<ParseResponse>;

    fn analyze(&self, response: &Response) -> (Vec<ParsedData>, Vec<anyhow::Error>);
}

/// Runs an item through a chain of processors.
pub trait Pipeline: Module {
    fn item_processors(&self) -> Vec<ProcessItem>;

    fn send(&self, item: Item) -> Vec<anyhow::Error>;

    /// When set, the first processor error ends processing of that item.
    fn fail_fast(&self) -> bool;

    fn set_fail_fast(&self, fail_fast: bool);
}

/// The transport a [`FetchDownloader`] delegates to.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Response>;
}

/// Parses a response at the given depth into new requests and items.
pub type ParseResponse =
    Arc<dyn Fn(&Response, u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) + Send + Sync>;

/// One pipeline step. `Ok(Some(item))` hands `item` to the next step and
/// `Ok(None)` drops the item without error.
pub type ProcessItem = Arc<dyn Fn(Item) -> anyhow::Result<Option<Item>> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_round_trip() {
        for module_type in ModuleType::ALL {
            assert_eq!(ModuleType::from_letter(module_type.letter()), Some(module_type));
        }
        assert_eq!(ModuleType::from_letter('p'), None);
        assert_eq!(ModuleType::Pipeline.to_string(), "pipeline");
    }
}
