use crate::error::SpiderError;
use http::{HeaderMap, Method};
use std::fmt;
use url::Url;

/// A crawl request: a URL plus the depth at which it was discovered.
///
/// The first request of a crawl has depth 0; a request derived from a
/// response at depth `n` has depth `n + 1`.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    depth: u32,
    retries: u32,
}

impl Request {
    /// Creates a `GET` request at depth 0.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            depth: 0,
            retries: 0,
        }
    }

    /// Parses `url` and creates a `GET` request at depth 0.
    pub fn parse(url: &str) -> Result<Self, SpiderError> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// How many times this request has been re-queued after a failure.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub(crate) fn bump_retries(&mut self) {
        self.retries = self.retries.saturating_add(1);
    }

    /// The key used for duplicate detection: the URL without its fragment.
    pub fn fingerprint(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request --> URL: {}, Method: {}, Depth: {}",
            self.url, self.method, self.depth
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_drops_fragment() {
        let request = Request::parse("http://example.com/a?b=1#top").unwrap();
        assert_eq!(request.fingerprint(), "http://example.com/a?b=1");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Request::parse("not a url"),
            Err(SpiderError::Url(_))
        ));
    }
}
