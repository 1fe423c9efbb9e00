//! Turns a resolved [`ResponseSpec`] into what is written back to the peer.
//!
//! Order of operations: wait out the spec's delay, apply headers, set the status, then
//! attach the body. A streamed body is written chunk by chunk by hyper and the exchange
//! closes once the chunk sequence is exhausted.

use core::convert::Infallible;
use core::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;

use crate::errors::{MockServerError, MockServerResult};
use crate::response::{ResponseBody, ResponseSpec};

pub type MockBody = UnsyncBoxBody<Bytes, Infallible>;

pub type MockResponse = hyper::Response<MockBody>;

/// Body sent when an exchange has no response to give.
pub const NO_RESPONSE_BODY: &str = "no response available";

pub fn empty() -> MockBody {
    Empty::<Bytes>::new().boxed_unsync()
}

pub fn full<T: Into<Bytes>>(chunk: T) -> MockBody {
    Full::new(chunk.into()).boxed_unsync()
}

/// Runs the pipeline for one exchange.
///
/// The delay suspends only the calling task, other exchanges keep being served.
///
/// # Errors
///
/// [`MockServerError::InvalidHeader`] or [`MockServerError::InvalidStatus`] when the spec
/// cannot be expressed on the wire.
pub async fn apply(spec: ResponseSpec) -> MockServerResult<MockResponse> {
    if let Some(delay) = spec.delay() {
        tracing::debug!("Delaying response by {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    let (status, headers, body, chunk_delay) = spec.into_parts();

    let mut response = hyper::Response::new(empty());
    for (name, value) in headers {
        response.headers_mut().append(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(&value)?,
        );
    }

    *response.status_mut() =
        StatusCode::from_u16(status).map_err(|_| MockServerError::InvalidStatus(status))?;

    *response.body_mut() = into_body(body, chunk_delay);
    Ok(response)
}

/// Response used for an exchange that found nothing to serve.
#[must_use]
pub fn no_response_available() -> MockResponse {
    let mut response = hyper::Response::new(full(NO_RESPONSE_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn into_body(body: ResponseBody, chunk_delay: Option<Duration>) -> MockBody {
    match body {
        ResponseBody::Bytes(bytes) => full(bytes),
        ResponseBody::Stream(source) => {
            let chunks = match chunk_delay {
                Some(delay) => source
                    .open()
                    .then(move |chunk| async move {
                        tokio::time::sleep(delay).await;
                        chunk
                    })
                    .boxed(),
                None => source.open(),
            };

            StreamBody::new(chunks.map(|chunk| Ok::<_, Infallible>(Frame::data(chunk))))
                .boxed_unsync()
        }
    }
}
