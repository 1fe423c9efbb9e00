//! Canned responses handed to the server.
//!
//! A [`ResponseSpec`] is built by test code (or a dispatcher), moved into the server
//! and consumed once by the pipeline. The body is either a finite byte buffer or a
//! replayable source of lazily produced chunks.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};

/// A lazily produced sequence of body chunks.
pub type ChunkStream = BoxStream<'static, Bytes>;

/// Factory for a chunk stream.
///
/// Every call to [`ChunkSource::open`] starts the sequence from its beginning, which lets
/// one streamed spec serve as the default response for many exchanges.
#[derive(Clone)]
pub struct ChunkSource(Arc<dyn Fn() -> ChunkStream + Send + Sync>);

impl ChunkSource {
    pub fn new<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = Bytes> + Send + 'static,
    {
        Self(Arc::new(move || factory().boxed()))
    }

    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        let chunks: Vec<Bytes> = chunks.into_iter().map(Into::into).collect();
        Self::new(move || stream::iter(chunks.clone()))
    }

    #[must_use]
    pub fn open(&self) -> ChunkStream {
        (self.0)()
    }
}

impl fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChunkSource(..)")
    }
}

/// Body of a canned response.
#[derive(Clone, Debug)]
pub enum ResponseBody {
    Bytes(Bytes),
    Stream(ChunkSource),
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::Bytes(Bytes::new())
    }
}

impl ResponseBody {
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl From<Bytes> for ResponseBody {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for ResponseBody {
    fn from(value: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(value))
    }
}

impl<const N: usize> From<&'static [u8; N]> for ResponseBody {
    fn from(value: &'static [u8; N]) -> Self {
        Self::Bytes(Bytes::from_static(value))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<ChunkSource> for ResponseBody {
    fn from(value: ChunkSource) -> Self {
        Self::Stream(value)
    }
}

/// One response the server will emit.
///
/// The status code is not validated here; an out of range code only fails when the
/// pipeline writes it.
///
/// ```rust
/// use core::time::Duration;
/// use foundation_mockserver::ResponseSpec;
///
/// let spec = ResponseSpec::new("Created", 201)
///     .with_header("X-Server", "Mock")
///     .with_delay(Duration::from_millis(20));
///
/// assert_eq!(spec.status_code(), 201);
/// assert_eq!(spec.header("x-server"), Some("Mock"));
/// ```
#[derive(Clone, Debug)]
pub struct ResponseSpec {
    status: u16,
    headers: Vec<(String, String)>,
    body: ResponseBody,
    delay: Option<Duration>,
    chunk_delay: Option<Duration>,
}

impl ResponseSpec {
    pub fn new(body: impl Into<ResponseBody>, status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            delay: None,
            chunk_delay: None,
        }
    }

    /// 200 response with the given body.
    pub fn ok(body: impl Into<ResponseBody>) -> Self {
        Self::new(body, 200)
    }

    /// Empty-bodied response with the given status.
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self::new(ResponseBody::default(), status)
    }

    /// Streamed response replaying `chunks` in order.
    pub fn chunked<I, C>(chunks: I, status: u16) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        Self::new(ChunkSource::from_chunks(chunks), status)
    }

    /// Sets a header, replacing an existing one with the same name (ignoring case)
    /// in place.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    #[must_use]
    pub fn with_headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        headers
            .into_iter()
            .fold(self, |spec, (name, value)| spec.with_header(name, value))
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Waits `delay` before anything of the response is written.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Waits `delay` before each chunk of a streamed body. Ignored for byte bodies.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    #[must_use]
    pub fn chunk_delay(&self) -> Option<Duration> {
        self.chunk_delay
    }

    pub(crate) fn into_parts(self) -> (u16, Vec<(String, String)>, ResponseBody, Option<Duration>) {
        (self.status, self.headers, self.body, self.chunk_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_with_same_name_is_replaced_in_place() {
        let spec = ResponseSpec::ok("body")
            .with_header("Content-Type", "text/plain")
            .with_header("X-Trace", "1")
            .with_header("content-type", "application/json");

        assert_eq!(
            spec.headers(),
            &[
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn spec_without_headers_or_delay_has_none() {
        let spec = ResponseSpec::with_status(204);
        assert!(spec.headers().is_empty());
        assert_eq!(spec.delay(), None);
        assert!(matches!(spec.body(), ResponseBody::Bytes(b) if b.is_empty()));
    }

    #[tokio::test]
    async fn chunk_source_replays_from_the_start_on_every_open() {
        let source = ChunkSource::from_chunks(vec!["a", "b", "c"]);

        let first: Vec<Bytes> = source.open().collect().await;
        let second: Vec<Bytes> = source.open().collect().await;

        assert_eq!(first, vec!["a", "b", "c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn chunked_spec_is_a_stream_body() {
        let spec = ResponseSpec::chunked(vec![vec![1u8, 2], vec![3]], 200);
        assert!(spec.body().is_stream());
    }
}
