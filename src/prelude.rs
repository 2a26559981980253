//! A "prelude" for users of the `spider-sched` crate.
//!
//! This prelude re-exports the most commonly used traits, structs, and macros
//! so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use spider_sched::prelude::*;
//! ```

pub use crate::{
    // Core structs
    Crawler,
    CrawlerBuilder,
    Scheduler,
    // Configuration
    DataArgs,
    ModuleArgs,
    RequestArgs,
    // Payloads
    Item,
    ParsedData,
    Request,
    Response,
    // Module traits
    Analyzer,
    Downloader,
    Fetcher,
    Module,
    ModuleBase,
    Pipeline,
    // Errors
    CrawlerError,
    SpiderError,
    // Essential re-exports for trait implementation
    async_trait,
};
