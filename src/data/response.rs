use super::Request;
use crate::buffer::MultipleReader;
use crate::error::SpiderError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::io::{Cursor, Read};
use url::Url;

/// A downloaded page together with the request that produced it.
///
/// The body is held as `Bytes`, so any number of parsers can read it in turn.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    request: Request,
    retries: u32,
}

impl Response {
    pub fn new(request: Request, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            url: request.url.clone(),
            status,
            headers,
            body,
            request,
            retries: 0,
        }
    }

    /// Builds a response by draining `reader` once into a shared buffer.
    pub fn from_reader<R: Read>(
        request: Request,
        status: StatusCode,
        headers: HeaderMap,
        reader: R,
    ) -> Result<Self, SpiderError> {
        let multiple = MultipleReader::new(reader)?;
        Ok(Self::new(request, status, headers, multiple.bytes()))
    }

    /// The depth of the request this response answers.
    pub fn depth(&self) -> u32 {
        self.request.depth()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// A fresh reader over the whole body.
    pub fn body_reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.body.clone())
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns the `Content-Type` header value, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Creates a request for `href`, resolved against this response's URL,
    /// one level deeper than this response.
    pub fn follow(&self, href: &str) -> Result<Request, SpiderError> {
        let url = self.url.join(href)?;
        Ok(Request::new(url).with_depth(self.depth().saturating_add(1)))
    }

    pub(crate) fn retries(&self) -> u32 {
        self.retries
    }

    pub(crate) fn bump_retries(&mut self) {
        self.retries = self.retries.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &'static str) -> Response {
        let request = Request::parse("http://example.com/dir/page").unwrap().with_depth(2);
        Response::new(request, StatusCode::OK, HeaderMap::new(), Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn follow_resolves_relative_and_deepens() {
        let resp = response("");
        let next = resp.follow("../other?q=1").unwrap();
        assert_eq!(next.url.as_str(), "http://example.com/other?q=1");
        assert_eq!(next.depth(), 3);
    }

    #[test]
    fn body_can_be_read_repeatedly() {
        let resp = response("<html></html>");
        let mut first = String::new();
        let mut second = String::new();
        resp.body_reader().read_to_string(&mut first).unwrap();
        resp.body_reader().read_to_string(&mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(resp.text(), "<html></html>");
    }
}
