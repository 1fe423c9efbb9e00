use core::time::Duration;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::errors::{MockServerError, MockServerResult};
use crate::request::RecordedRequest;

/// Requests received by the server, oldest first.
///
/// The server appends when a request body finished reading; test code consumes from
/// the head.
#[derive(Default)]
pub struct RequestLog {
    records: Mutex<VecDeque<RecordedRequest>>,
    arrivals: Notify,
}

impl RequestLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: RecordedRequest) {
        self.lock().push_back(record);
        self.arrivals.notify_waiters();
    }

    /// Removes and returns the oldest record without waiting.
    ///
    /// # Errors
    ///
    /// [`MockServerError::EmptyLog`] when nothing has been recorded.
    pub fn take(&self) -> MockServerResult<RecordedRequest> {
        self.lock().pop_front().ok_or(MockServerError::EmptyLog)
    }

    /// Like [`RequestLog::take`] but waits up to `timeout` for a record to arrive.
    ///
    /// # Errors
    ///
    /// [`MockServerError::EmptyLog`] when the timeout passes with nothing recorded.
    pub async fn take_within(&self, timeout: Duration) -> MockServerResult<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Ok(record) = self.take() {
                return Ok(record);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.take();
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RecordedRequest>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
