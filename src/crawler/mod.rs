//! # Crawler Module
//!
//! The [`Crawler`] runs one end-to-end crawl on a [`Scheduler`](crate::Scheduler)
//! and is normally assembled with a [`CrawlerBuilder`](crate::CrawlerBuilder).

mod core;

pub use self::core::Crawler;
