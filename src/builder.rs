//! # Builder Module
//!
//! Provides the `CrawlerBuilder`, a fluent API for assembling the request,
//! data and module arguments of a [`Crawler`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_sched::prelude::*;
//!
//! fn titles(resp: &Response, depth: u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
//!     let item = Item::new().with("url", resp.url.as_str()).with("depth", depth);
//!     (vec![item.into()], vec![])
//! }
//!
//! async fn run() -> Result<(), SpiderError> {
//!     let crawler = CrawlerBuilder::new()
//!         .max_depth(2)
//!         .downloaders(4)
//!         .parser(titles)
//!         .processor(|item| Ok(Some(item)))
//!         .build()?;
//!
//!     let summary = crawler.crawl(Request::parse("https://example.com")?).await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

use crate::crawler::Crawler;
use crate::data::{Item, ParsedData, Response};
use crate::error::SpiderError;
use crate::module::{analyzers, downloaders, pipelines, Fetcher, ParseResponse, ProcessItem};
use crate::scheduler::{DataArgs, ModuleArgs, RequestArgs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct CrawlerBuilder {
    request_args: RequestArgs,
    data_args: DataArgs,
    downloader_number: u32,
    analyzer_number: u32,
    pipeline_number: u32,
    fetcher: Option<Arc<dyn Fetcher>>,
    parsers: Vec<ParseResponse>,
    processors: Vec<ProcessItem>,
    fail_fast: bool,
    max_idle_count: u32,
    idle_interval: Duration,
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self {
            request_args: RequestArgs::default().with_max_retries(3),
            data_args: DataArgs::default(),
            downloader_number: 2,
            analyzer_number: 1,
            pipeline_number: 1,
            fetcher: None,
            parsers: Vec::new(),
            processors: Vec::new(),
            fail_fast: true,
            max_idle_count: 5,
            idle_interval: Duration::from_millis(100),
        }
    }
}

impl CrawlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts requests whose primary domain is `domain`, in addition to the
    /// primary domain of the first request.
    pub fn accepted_domain(mut self, domain: impl Into<String>) -> Self {
        self.request_args.accepted_domains.push(domain.into());
        self
    }

    pub fn accepted_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_args
            .accepted_domains
            .extend(domains.into_iter().map(Into::into));
        self
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.request_args.max_depth = max_depth;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.request_args.max_retries = max_retries;
        self
    }

    /// Sets the sizing of the four buffer pools.
    pub fn data_args(mut self, data_args: DataArgs) -> Self {
        self.data_args = data_args;
        self
    }

    pub fn downloaders(mut self, number: u32) -> Self {
        self.downloader_number = number;
        self
    }

    pub fn analyzers(mut self, number: u32) -> Self {
        self.analyzer_number = number;
        self
    }

    pub fn pipelines(mut self, number: u32) -> Self {
        self.pipeline_number = number;
        self
    }

    /// Sets the transport shared by every downloader.
    pub fn fetcher<F: Fetcher>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Adds a response parser. Every analyzer runs every parser.
    pub fn parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&Response, u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) + Send + Sync + 'static,
    {
        self.parsers.push(Arc::new(parser));
        self
    }

    /// Appends an item processor to every pipeline.
    pub fn processor<F>(mut self, processor: F) -> Self
    where
        F: Fn(Item) -> anyhow::Result<Option<Item>> + Send + Sync + 'static,
    {
        self.processors.push(Arc::new(processor));
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// How many consecutive idle checks end the crawl.
    pub fn max_idle_count(mut self, count: u32) -> Self {
        self.max_idle_count = count;
        self
    }

    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Builds the modules and returns a `Crawler` ready to run.
    ///
    /// Without an explicit fetcher, a `ReqwestFetcher` is used when the
    /// `reqwest` feature is enabled.
    pub fn build(self) -> Result<Crawler, SpiderError> {
        self.validate()?;
        let fetcher = self.resolve_fetcher()?;

        let downloaders = downloaders(self.downloader_number, fetcher)?;
        let analyzers = analyzers(self.analyzer_number, self.parsers)?;
        let pipelines = pipelines(self.pipeline_number, self.processors)?;
        if !self.fail_fast {
            for module in &pipelines {
                if let Some(pipeline) = module.as_pipeline() {
                    pipeline.set_fail_fast(false);
                }
            }
        }
        debug!(
            "Built {} downloaders, {} analyzers and {} pipelines",
            downloaders.len(),
            analyzers.len(),
            pipelines.len()
        );

        Ok(Crawler::new(
            self.request_args,
            self.data_args,
            ModuleArgs::new(downloaders, analyzers, pipelines),
            self.max_idle_count,
            self.idle_interval,
        ))
    }

    fn validate(&self) -> Result<(), SpiderError> {
        if self.downloader_number == 0 {
            return Err(SpiderError::illegal("downloader number must be greater than 0"));
        }
        if self.analyzer_number == 0 {
            return Err(SpiderError::illegal("analyzer number must be greater than 0"));
        }
        if self.pipeline_number == 0 {
            return Err(SpiderError::illegal("pipeline number must be greater than 0"));
        }
        if self.parsers.is_empty() {
            return Err(SpiderError::illegal("no response parser"));
        }
        if self.processors.is_empty() {
            return Err(SpiderError::illegal("no item processor"));
        }
        self.data_args.check()
    }

    #[cfg(feature = "reqwest")]
    fn resolve_fetcher(&self) -> Result<Arc<dyn Fetcher>, SpiderError> {
        Ok(match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(crate::module::ReqwestFetcher::new()),
        })
    }

    #[cfg(not(feature = "reqwest"))]
    fn resolve_fetcher(&self) -> Result<Arc<dyn Fetcher>, SpiderError> {
        self.fetcher
            .clone()
            .ok_or_else(|| SpiderError::illegal("no fetcher configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Request;
    use async_trait::async_trait;

    struct NoopFetcher;

    #[async_trait]
    impl Fetcher for NoopFetcher {
        async fn fetch(&self, _request: &Request) -> anyhow::Result<Response> {
            anyhow::bail!("offline")
        }
    }

    fn nothing(_resp: &Response, _depth: u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
        (vec![], vec![])
    }

    fn keep(item: Item) -> anyhow::Result<Option<Item>> {
        Ok(Some(item))
    }

    #[test]
    fn parsers_and_processors_are_required() {
        let err = CrawlerBuilder::new().fetcher(NoopFetcher).processor(keep).build().unwrap_err();
        assert_eq!(err.to_string(), "illegal parameter: no response parser");

        let err = CrawlerBuilder::new().fetcher(NoopFetcher).parser(nothing).build().unwrap_err();
        assert_eq!(err.to_string(), "illegal parameter: no item processor");

        let err = CrawlerBuilder::new()
            .fetcher(NoopFetcher)
            .parser(nothing)
            .processor(keep)
            .downloaders(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, SpiderError::IllegalParameter(_)));
    }

    #[test]
    fn fail_fast_can_be_turned_off() {
        let crawler = CrawlerBuilder::new()
            .fetcher(NoopFetcher)
            .parser(nothing)
            .processor(keep)
            .pipelines(2)
            .fail_fast(false)
            .build()
            .unwrap();
        let pipelines = &crawler.module_args().pipelines;
        assert_eq!(pipelines.len(), 2);
        assert!(pipelines
            .iter()
            .all(|m| !m.as_pipeline().unwrap().fail_fast()));
        assert_eq!(crawler.scheduler().status(), crate::scheduler::Status::Uninitialized);
    }
}
