//! FIFO store of canned responses with an optional fallback.
//!
//! WHY: Tests script the server by listing the responses it should give, in order.
//!
//! WHAT: [`ResponseQueue`] hands out each enqueued [`ResponseSpec`] exactly once, oldest
//! first, and falls back to a default when empty.
//!
//! HOW: A single mutex guards both the pending responses and the default, so a pop is
//! atomic with respect to concurrent exchanges.

use core::time::Duration;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::{MockServerError, MockServerResult};
use crate::response::{ResponseBody, ResponseSpec};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ResponseSpec>,
    default_response: Option<ResponseSpec>,
}

#[derive(Default)]
pub struct ResponseQueue {
    state: Mutex<QueueState>,
}

impl ResponseQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, spec: ResponseSpec) {
        tracing::debug!("Enqueue response with status {}", spec.status_code());
        self.lock().pending.push_back(spec);
    }

    /// Builds a [`ResponseSpec`] from its parts and enqueues it.
    pub fn enqueue_parts<I, K, V>(
        &self,
        body: impl Into<ResponseBody>,
        status: u16,
        headers: Option<I>,
        delay: Option<Duration>,
    ) where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut spec = ResponseSpec::new(body, status);
        if let Some(headers) = headers {
            spec = spec.with_headers(headers);
        }
        if let Some(delay) = delay {
            spec = spec.with_delay(delay);
        }
        self.enqueue(spec);
    }

    /// Sets or clears the response used whenever the queue is empty.
    pub fn set_default(&self, spec: Option<ResponseSpec>) {
        self.lock().default_response = spec;
    }

    /// Pops the oldest response, or returns the default when nothing is queued.
    ///
    /// # Errors
    ///
    /// [`MockServerError::NoResponseAvailable`] when the queue is empty and no default is set.
    pub fn resolve(&self) -> MockServerResult<ResponseSpec> {
        let mut state = self.lock();
        if let Some(spec) = state.pending.pop_front() {
            return Ok(spec);
        }

        state
            .default_response
            .clone()
            .ok_or(MockServerError::NoResponseAvailable)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
