use std::net::SocketAddr;

use bytes::Bytes;

/// Separator used when a header was sent more than once.
pub const HEADER_VALUE_SEPARATOR: &str = ", ";

/// One request as received by the server.
///
/// Built once the request body has been read to completion and never changed after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Zero based acceptance index on the server that received it.
    pub sequence: usize,
    pub method: String,
    /// Path and query, exactly as sent in the request line.
    pub uri: String,
    pub version: String,
    /// One entry per header name, repeated values joined with [`HEADER_VALUE_SEPARATOR`].
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8, invalid sequences replaced.
    pub body: String,
    pub body_bytes: Bytes,
    pub peer: Option<SocketAddr>,
}

impl RecordedRequest {
    pub(crate) fn from_parts(
        sequence: usize,
        parts: &http::request::Parts,
        body_bytes: Bytes,
        peer: Option<SocketAddr>,
    ) -> Self {
        let uri = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.to_string(), ToString::to_string);

        Self {
            sequence,
            method: parts.method.to_string(),
            uri,
            version: format!("{:?}", parts.version),
            headers: flatten_headers(&parts.headers),
            body: String::from_utf8_lossy(&body_bytes).into_owned(),
            body_bytes,
            peer,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.uri
            .split_once('?')
            .map_or(self.uri.as_str(), |(path, _)| path)
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn flatten_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(HEADER_VALUE_SEPARATOR);
            (name.as_str().to_string(), joined)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts_for(request: http::Request<()>) -> http::request::Parts {
        request.into_parts().0
    }

    #[test]
    fn repeated_headers_are_joined_in_order() {
        let parts = parts_for(
            http::Request::builder()
                .method("POST")
                .uri("/items?limit=2")
                .header("Accept", "text/plain")
                .header("X-Tag", "one")
                .header("X-Tag", "two")
                .body(())
                .unwrap(),
        );

        let recorded = RecordedRequest::from_parts(3, &parts, Bytes::from_static(b"hello"), None);

        assert_eq!(recorded.sequence, 3);
        assert_eq!(recorded.method, "POST");
        assert_eq!(recorded.uri, "/items?limit=2");
        assert_eq!(recorded.path(), "/items");
        assert_eq!(recorded.query(), Some("limit=2"));
        assert_eq!(recorded.header("x-tag"), Some("one, two"));
        assert_eq!(recorded.header("ACCEPT"), Some("text/plain"));
        assert_eq!(recorded.body, "hello");
    }

    #[test]
    fn invalid_utf8_body_is_decoded_lossily() {
        let parts = parts_for(http::Request::builder().uri("/").body(()).unwrap());
        let recorded =
            RecordedRequest::from_parts(0, &parts, Bytes::from_static(&[0x66, 0xff, 0x6f]), None);

        assert_eq!(recorded.body, "f\u{fffd}o");
        assert_eq!(recorded.body_bytes.len(), 3);
        assert_eq!(recorded.query(), None);
    }
}
