use super::{sn, Downloader, Fetcher, Mid, Module, ModuleBase, ModuleType, ScoreCalculator};
use crate::data::{Request, Response};
use crate::error::SpiderError;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// A downloader that hands every request to a [`Fetcher`].
pub struct FetchDownloader {
    base: ModuleBase,
    fetcher: Arc<dyn Fetcher>,
}

impl FetchDownloader {
    pub fn new(
        mid: Mid,
        fetcher: Arc<dyn Fetcher>,
        calculator: ScoreCalculator,
    ) -> Result<Self, SpiderError> {
        if mid.module_type() != ModuleType::Downloader {
            return Err(SpiderError::IncorrectModuleType {
                mid,
                module_type: ModuleType::Downloader,
            });
        }
        Ok(Self {
            base: ModuleBase::with_calculator(mid, calculator),
            fetcher,
        })
    }
}

impl Module for FetchDownloader {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn as_downloader(&self) -> Option<&dyn Downloader> {
        Some(self)
    }
}

#[async_trait]
impl Downloader for FetchDownloader {
    async fn download(&self, request: &Request) -> anyhow::Result<Response> {
        let _handling = self.base.begin_handling();
        self.base.incr_called_count();
        self.base.incr_accepted_count();

        trace!(
            "[Downloader] --> Do the request (URL: {}, depth: {})",
            request.url,
            request.depth()
        );
        let response = self
            .fetcher
            .fetch(request)
            .await
            .with_context(|| format!("download {} failed", request.url))?;

        self.base.incr_completed_count();
        Ok(response)
    }
}

/// Creates `number` downloaders sharing `fetcher`, with serials from the
/// global generator.
pub fn downloaders(
    number: u32,
    fetcher: Arc<dyn Fetcher>,
) -> Result<Vec<Arc<dyn Module>>, SpiderError> {
    let mut modules: Vec<Arc<dyn Module>> = Vec::with_capacity(number as usize);
    for _ in 0..number {
        let mid = Mid::new(ModuleType::Downloader, sn::global().get(), None);
        let downloader = FetchDownloader::new(mid, Arc::clone(&fetcher), super::calculate_score_simple)?;
        modules.push(Arc::new(downloader));
    }
    Ok(modules)
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_fetcher::ReqwestFetcher;

#[cfg(feature = "reqwest")]
mod reqwest_fetcher {
    use super::*;

    /// A [`Fetcher`] backed by a shared `reqwest::Client`.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestFetcher {
        client: reqwest::Client,
    }

    impl ReqwestFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Fetcher for ReqwestFetcher {
        async fn fetch(&self, request: &Request) -> anyhow::Result<Response> {
            let resp = self
                .client
                .request(request.method.clone(), request.url.clone())
                .headers(request.headers.clone())
                .send()
                .await?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.bytes().await?;
            Ok(Response::new(request.clone(), status, headers, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};

    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, request: &Request) -> anyhow::Result<Response> {
            if request.url.path() == "/fail" {
                anyhow::bail!("connection refused");
            }
            Ok(Response::new(
                request.clone(),
                StatusCode::OK,
                HeaderMap::new(),
                Bytes::from_static(b"ok"),
            ))
        }
    }

    #[tokio::test]
    async fn counts_successful_and_failed_downloads() {
        let modules = downloaders(1, Arc::new(EchoFetcher)).unwrap();
        let module = &modules[0];
        let downloader = module.as_downloader().unwrap();

        let ok = Request::parse("http://example.com/").unwrap();
        let response = downloader.download(&ok).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let bad = Request::parse("http://example.com/fail").unwrap();
        let err = downloader.download(&bad).await.unwrap_err();
        assert!(format!("{:#}", err).contains("connection refused"));

        let counts = module.counts();
        assert_eq!(counts.called, 2);
        assert_eq!(counts.accepted, 2);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.handling, 0);
    }

    #[test]
    fn rejects_foreign_mid() {
        let mid = Mid::new(ModuleType::Pipeline, 1, None);
        assert!(matches!(
            FetchDownloader::new(mid, Arc::new(EchoFetcher), super::super::calculate_score_simple),
            Err(SpiderError::IncorrectModuleType { .. })
        ));
    }

    #[test]
    fn factory_mints_distinct_downloader_mids() {
        let modules = downloaders(3, Arc::new(EchoFetcher)).unwrap();
        assert_eq!(modules.len(), 3);
        assert!(modules
            .iter()
            .all(|m| m.id().module_type() == ModuleType::Downloader));
        assert_ne!(modules[0].id(), modules[1].id());
    }
}
