//! Error types shared by every component of the engine.
//!
//! `SpiderError` is the crate-wide error returned from synchronous calls
//! (configuration, registration, lifecycle transitions, buffer operations).
//! `CrawlerError` is the stage-tagged error that pump loops push into the
//! error pool; it is `Clone` so it can travel through buffers and channels.

use crate::module::{Mid, ModuleType};
use std::fmt;
use thiserror::Error;

/// The stage a `CrawlerError` originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Downloader,
    Analyzer,
    Pipeline,
    Scheduler,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Downloader => "downloader error",
            ErrorKind::Analyzer => "analyzer error",
            ErrorKind::Pipeline => "pipeline error",
            ErrorKind::Scheduler => "scheduler error",
        };
        f.write_str(s)
    }
}

impl From<ModuleType> for ErrorKind {
    fn from(module_type: ModuleType) -> Self {
        match module_type {
            ModuleType::Downloader => ErrorKind::Downloader,
            ModuleType::Analyzer => ErrorKind::Analyzer,
            ModuleType::Pipeline => ErrorKind::Pipeline,
        }
    }
}

/// An error raised while a payload moved through one of the crawl stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("crawler error: {kind}: {message}")]
pub struct CrawlerError {
    kind: ErrorKind,
    message: String,
}

impl CrawlerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into().trim().to_string(),
        }
    }

    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scheduler, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Turns an arbitrary failure into a tagged `CrawlerError`.
    ///
    /// Errors that already are `CrawlerError`s keep their tag. Anything else is
    /// tagged with the module type encoded in `mid`, or with
    /// `ErrorKind::Scheduler` when there is no MID.
    pub fn classify(err: anyhow::Error, mid: Option<&Mid>) -> Self {
        let err = match err.downcast::<CrawlerError>() {
            Ok(crawler_error) => return crawler_error,
            Err(err) => err,
        };
        let err = match err.downcast::<SpiderError>() {
            Ok(SpiderError::Crawler(crawler_error)) => return crawler_error,
            Ok(other) => anyhow::Error::new(other),
            Err(err) => err,
        };
        let kind = mid
            .map(|mid| ErrorKind::from(mid.module_type()))
            .unwrap_or(ErrorKind::Scheduler);
        Self::new(kind, format!("{:#}", err))
    }
}

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("illegal parameter: {0}")]
    IllegalParameter(String),

    #[error(transparent)]
    Crawler(#[from] CrawlerError),

    #[error("closed buffer")]
    ClosedBuffer,

    #[error("closed pool")]
    ClosedPool,

    #[error("not found module instance of type {0}")]
    ModuleNotFound(ModuleType),

    #[error("incorrect module type: {mid} does not implement {module_type}")]
    IncorrectModuleType { mid: Mid, module_type: ModuleType },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SpiderError {
    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        SpiderError::IllegalParameter(msg.into().trim().to_string())
    }

    pub(crate) fn scheduler(msg: impl Into<String>) -> Self {
        SpiderError::Crawler(CrawlerError::scheduler(msg))
    }

    /// Returns the `CrawlerError` carried by this error, if any.
    pub fn as_crawler_error(&self) -> Option<&CrawlerError> {
        match self {
            SpiderError::Crawler(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_keeps_existing_tag() {
        let original = CrawlerError::new(ErrorKind::Analyzer, "bad markup");
        let classified = CrawlerError::classify(anyhow::Error::new(original.clone()), None);
        assert_eq!(classified, original);
    }

    #[test]
    fn classify_uses_mid_letter() {
        let mid: Mid = "P7".parse().unwrap();
        let classified = CrawlerError::classify(anyhow::anyhow!("disk full"), Some(&mid));
        assert_eq!(classified.kind(), ErrorKind::Pipeline);
        assert_eq!(classified.message(), "disk full");
    }

    #[test]
    fn classify_without_mid_is_scheduler() {
        let classified = CrawlerError::classify(anyhow::anyhow!("boom"), None);
        assert_eq!(classified.kind(), ErrorKind::Scheduler);
        assert_eq!(
            classified.to_string(),
            "crawler error: scheduler error: boom"
        );
    }

    #[test]
    fn illegal_parameter_display() {
        let err = SpiderError::illegal("  zero buffer capacity ");
        assert_eq!(err.to_string(), "illegal parameter: zero buffer capacity");
    }
}
