//! Per-request response resolution.
//!
//! A registered [`Dispatcher`] computes every response and the queue is never consulted
//! while one is present. Without one, the [`ResponseQueue`] decides.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::errors::MockServerResult;
use crate::queue::ResponseQueue;
use crate::request::RecordedRequest;
use crate::response::ResponseSpec;

/// Computes a response for each request, superseding the response queue.
///
/// Dispatchers may suspend (for example to simulate a slow backend); that wait comes on
/// top of any delay carried by the returned [`ResponseSpec`].
///
/// Any async closure taking a [`RecordedRequest`] is a dispatcher:
///
/// ```rust
/// use foundation_mockserver::{Dispatcher, RecordedRequest, ResponseSpec};
///
/// fn assert_dispatcher<D: Dispatcher>(_: D) {}
///
/// assert_dispatcher(|req: RecordedRequest| async move {
///     if req.path() == "/health" {
///         ResponseSpec::ok("up")
///     } else {
///         ResponseSpec::with_status(404)
///     }
/// });
/// ```
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &RecordedRequest) -> ResponseSpec;
}

#[async_trait]
impl<F, Fut> Dispatcher for F
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResponseSpec> + Send + 'static,
{
    async fn dispatch(&self, request: &RecordedRequest) -> ResponseSpec {
        (self)(request.clone()).await
    }
}

/// Dispatcher backed by a synchronous function, see [`dispatch_fn`].
pub struct FnDispatcher<F>(F);

/// Wraps a plain `Fn(&RecordedRequest) -> ResponseSpec` as a [`Dispatcher`].
pub fn dispatch_fn<F>(handler: F) -> FnDispatcher<F>
where
    F: Fn(&RecordedRequest) -> ResponseSpec + Send + Sync + 'static,
{
    FnDispatcher(handler)
}

#[async_trait]
impl<F> Dispatcher for FnDispatcher<F>
where
    F: Fn(&RecordedRequest) -> ResponseSpec + Send + Sync + 'static,
{
    async fn dispatch(&self, request: &RecordedRequest) -> ResponseSpec {
        (self.0)(request)
    }
}

/// Which source produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Dispatcher,
    Queue,
}

/// Holds the response queue and the optional dispatcher overriding it.
#[derive(Default)]
pub struct Resolver {
    queue: ResponseQueue,
    dispatcher: Mutex<Option<Arc<dyn Dispatcher>>>,
}

impl Resolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn queue(&self) -> &ResponseQueue {
        &self.queue
    }

    /// Installs `dispatcher`, replacing any previous one.
    pub fn set_dispatcher(&self, dispatcher: Option<Arc<dyn Dispatcher>>) {
        *self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = dispatcher;
    }

    #[must_use]
    pub fn has_dispatcher(&self) -> bool {
        self.current_dispatcher().is_some()
    }

    /// Picks the response for `request`.
    ///
    /// # Errors
    ///
    /// [`crate::MockServerError::NoResponseAvailable`] when there is no dispatcher and the
    /// queue has neither a pending response nor a default.
    pub async fn resolve(
        &self,
        request: &RecordedRequest,
    ) -> MockServerResult<(ResponseSpec, Resolution)> {
        // The lock is released before awaiting so a slow dispatcher never holds it.
        if let Some(dispatcher) = self.current_dispatcher() {
            let spec = dispatcher.dispatch(request).await;
            return Ok((spec, Resolution::Dispatcher));
        }

        self.queue.resolve().map(|spec| (spec, Resolution::Queue))
    }

    fn current_dispatcher(&self) -> Option<Arc<dyn Dispatcher>> {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
