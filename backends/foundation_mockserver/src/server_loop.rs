//! Accept loop and the per-exchange state machine.
//!
//! Every request goes `Accepted -> BodyRead -> Recorded -> Resolved -> Responded`, or
//! stops at `Failed` after being recorded when nothing can be resolved. Each connection
//! runs in its own task so one exchange's delay or stream never holds up another.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use http_body_util::BodyExt;
use hyper::body::Incoming as IncomingBody;
use hyper::server;
use hyper::service;
use hyper_util::rt::TokioIo;
use tokio::sync::watch;

use crate::config::MissingResponsePolicy;
use crate::dispatch::Resolver;
use crate::errors::{MockServerError, MockServerResult};
use crate::listener::{Incoming, SharedListener};
use crate::pipeline::{self, MockResponse};
use crate::request::RecordedRequest;
use crate::request_log::RequestLog;

/// State shared by the server handle and every exchange.
pub(crate) struct ServerState {
    pub(crate) resolver: Resolver,
    pub(crate) log: RequestLog,
    request_count: AtomicUsize,
    policy: MissingResponsePolicy,
    stop: watch::Sender<bool>,
    terminated: AtomicBool,
    connection_errors: Mutex<Vec<MockServerError>>,
}

impl ServerState {
    pub(crate) fn new(policy: MissingResponsePolicy) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            resolver: Resolver::new(),
            log: RequestLog::new(),
            request_count: AtomicUsize::new(0),
            policy,
            stop,
            terminated: AtomicBool::new(false),
            connection_errors: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub(crate) fn signal_stop(&self) {
        self.stop.send_replace(true);
    }

    pub(crate) fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// Whether an exchange stopped the server for lack of a response.
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn take_connection_errors(&self) -> Vec<MockServerError> {
        std::mem::take(
            &mut *self
                .connection_errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn record_connection_error(&self, err: MockServerError) {
        self.connection_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err);
    }

    fn stopped(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.stop.subscribe();
        async move {
            // An error means the sender is gone, which also means stop.
            let _ = receiver.wait_for(|stopped| *stopped).await;
        }
    }

    /// Runs one exchange through the state machine.
    async fn serve_exchange(
        &self,
        request: hyper::Request<IncomingBody>,
        peer: Option<SocketAddr>,
    ) -> MockServerResult<MockResponse> {
        // Accepted
        let sequence = self.request_count.fetch_add(1, Ordering::SeqCst);
        let (parts, body) = request.into_parts();
        tracing::info!(
            "Accepted request #{} method: {}, uri: {}, peer: {:?}",
            sequence,
            parts.method,
            parts.uri,
            peer,
        );

        // BodyRead
        let body_bytes = body
            .collect()
            .await
            .map_err(MockServerError::BodyRead)?
            .to_bytes();

        // Recorded
        let record = RecordedRequest::from_parts(sequence, &parts, body_bytes, peer);
        self.log.append(record.clone());
        tracing::debug!("Recorded request #{}", sequence);

        // Resolved
        match self.resolver.resolve(&record).await {
            Ok((spec, source)) => {
                tracing::debug!(
                    "Resolved request #{} from {:?} with status {}",
                    sequence,
                    source,
                    spec.status_code()
                );
                // Responded
                pipeline::apply(spec).await
            }
            Err(MockServerError::NoResponseAvailable) => self.missing_response(&record),
            Err(err) => Err(err),
        }
    }

    fn missing_response(&self, record: &RecordedRequest) -> MockServerResult<MockResponse> {
        match self.policy {
            MissingResponsePolicy::RespondWithError => {
                tracing::warn!(
                    "No response available for request #{} {} {}, answering 500",
                    record.sequence,
                    record.method,
                    record.uri,
                );
                Ok(pipeline::no_response_available())
            }
            MissingResponsePolicy::CloseConnection => {
                tracing::warn!(
                    "No response available for request #{} {} {}, closing connection",
                    record.sequence,
                    record.method,
                    record.uri,
                );
                Err(MockServerError::NoResponseAvailable)
            }
            MissingResponsePolicy::TerminateServer => {
                tracing::error!(
                    "No response available for request #{} {} {}, terminating server",
                    record.sequence,
                    record.method,
                    record.uri,
                );
                self.terminated.store(true, Ordering::SeqCst);
                self.signal_stop();
                Err(MockServerError::NoResponseAvailable)
            }
        }
    }
}

/// hyper service handing each request of a connection to [`ServerState::serve_exchange`].
struct ExchangeService {
    state: Arc<ServerState>,
    peer: Option<SocketAddr>,
}

type ExchangeFuture = dyn Future<Output = MockServerResult<MockResponse>> + Send + 'static;

impl service::Service<hyper::Request<IncomingBody>> for ExchangeService {
    type Response = MockResponse;
    type Error = MockServerError;
    type Future = Pin<Box<ExchangeFuture>>;

    fn call(&self, request: hyper::Request<IncomingBody>) -> Self::Future {
        let state = Arc::clone(&self.state);
        let peer = self.peer;
        Box::pin(async move { state.serve_exchange(request, peer).await })
    }
}

/// Serves every request of one connection until the peer leaves or the server stops.
///
/// On stop, requests already in flight complete before the connection closes.
async fn serve_connection(state: Arc<ServerState>, incoming: Incoming) -> MockServerResult<()> {
    let peer = incoming.peer();
    let io = incoming.establish().await?;
    let stopped = state.stopped();

    let service = ExchangeService { state, peer };
    let connection = server::conn::http1::Builder::new()
        .title_case_headers(true)
        .serve_connection(TokioIo::new(io), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        res = connection.as_mut() => res,
        () = stopped => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };

    result.map_err(MockServerError::Transport)
}

/// Accepts connections until stopped, spawning a task per connection.
///
/// # Errors
///
/// [`MockServerError::NoResponseAvailable`] when an exchange terminated the server, or the
/// accept error that ended the loop.
pub(crate) async fn run(state: Arc<ServerState>, listener: SharedListener) -> MockServerResult<()> {
    let stopped = state.stopped();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            biased;

            () = &mut stopped => {
                tracing::info!("Mock server on {} stopped accepting", listener.local_addr());
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok(incoming) => {
                    tracing::info!("Got a client connection: {:?}", incoming.peer());
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(Arc::clone(&state), incoming).await {
                            tracing::warn!("Mock server connection failed: {}", err);
                            state.record_connection_error(err);
                        }
                    });
                }
                Err(err) => {
                    tracing::error!("Mock server accept error: {}", err);
                    return Err(err);
                }
            }
        }
    }

    if state.is_terminated() {
        return Err(MockServerError::NoResponseAvailable);
    }
    Ok(())
}
