//! # spider-sched
//!
//! A concurrent crawl orchestration engine.
//!
//! Requests, responses, items and errors travel through four elastic
//! [`BufferPool`]s. A [`Scheduler`] runs one pump per stage and hands every
//! payload to the least loaded downloader, analyzer or pipeline module in its
//! [`Registry`]. New requests are filtered by scheme, primary domain, depth and
//! URL before they are queued. The actual HTTP transport, parsing and item
//! processing are supplied by the caller as a [`Fetcher`], parser functions
//! and item-processor functions.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_sched::prelude::*;
//!
//! fn links(resp: &Response, _depth: u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
//!     let mut data = Vec::new();
//!     let mut errors = Vec::new();
//!     for href in resp.text().lines() {
//!         match resp.follow(href) {
//!             Ok(req) => data.push(req.into()),
//!             Err(e) => errors.push(e.into()),
//!         }
//!     }
//!     (data, errors)
//! }
//!
//! async fn run_crawler() -> Result<(), SpiderError> {
//!     let crawler = CrawlerBuilder::new()
//!         .max_depth(1)
//!         .parser(links)
//!         .processor(|item| Ok(Some(item)))
//!         .build()?;
//!     let summary = crawler.crawl(Request::parse("https://example.com")?).await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod builder;
pub mod crawler;
pub mod data;
pub mod error;
pub mod module;
pub mod prelude;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use buffer::{Buffer, BufferPool, BufferPoolSummary, MultipleReader};
pub use builder::CrawlerBuilder;
pub use crawler::Crawler;
pub use data::{Item, ParsedData, Request, Response};
pub use error::{CrawlerError, ErrorKind, SpiderError};
pub use module::{
    Analyzer, Downloader, Fetcher, Mid, Module, ModuleBase, ModuleType, ParseResponse, Pipeline,
    ProcessItem, Registry,
};
pub use scheduler::{
    DataArgs, ModuleArgs, PoolArgs, RequestArgs, Scheduler, SchedulerSummary, Status,
};
pub use stats::StatCollector;

pub use async_trait::async_trait;
pub use tokio;
