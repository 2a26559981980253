//! The crawl scheduler.
//!
//! [`Scheduler`] owns the module registry and four buffer pools (requests,
//! responses, items, errors). Once started it runs one pump per stage:
//!
//! - the download pump hands requests to downloaders,
//! - the analyze pump hands responses to analyzers and routes their output,
//! - the pick pump hands items to pipelines.
//!
//! Every new request passes the scheme, primary domain, depth and duplicate
//! filters before it is queued.

mod args;
mod core;
mod domain;
mod item_processor;
mod request_handler;
mod response_parser;
mod status;
mod summary;

pub use self::args::{DataArgs, ModuleArgs, ModuleArgsSummary, PoolArgs, RequestArgs};
pub use self::core::Scheduler;
pub use self::domain::primary_domain;
pub use self::status::Status;
pub use self::summary::SchedulerSummary;
