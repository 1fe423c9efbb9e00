//! Public handle test code drives the mock server through.

use core::time::Duration;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::MockServerConfig;
use crate::dispatch::Dispatcher;
use crate::errors::{MockServerError, MockServerResult};
use crate::listener::{Listener, SharedListener, TcpTransport};
use crate::request::RecordedRequest;
use crate::response::{ResponseBody, ResponseSpec};
use crate::server_loop::{self, ServerState};

struct Running {
    local_addr: SocketAddr,
    secure: bool,
    handle: Option<JoinHandle<MockServerResult<()>>>,
}

/// Scriptable HTTP server for integration tests.
///
/// # Purpose (WHY)
///
/// Gives tests a real HTTP peer whose answers are fully scripted and whose received
/// requests can be inspected afterwards, without running a real backend.
///
/// # What it does
///
/// Serves queued responses in FIFO order (or a default when the queue is empty), unless a
/// [`Dispatcher`] is installed, in which case the dispatcher answers every request.
/// Every request is recorded before its response is chosen.
///
/// # Examples
///
/// ```rust
/// use foundation_mockserver::{MockServer, MockServerConfig, ResponseSpec};
///
/// # tokio_test_block_on(async {
/// let mut server = MockServer::new(MockServerConfig::new());
/// server.enqueue_response(ResponseSpec::new("Created", 201).with_header("X-Server", "Mock"));
/// server.start().await.unwrap();
///
/// assert!(server.base_url().unwrap().starts_with("http://127.0.0.1:"));
/// server.shutdown().await.unwrap();
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
pub struct MockServer {
    config: MockServerConfig,
    state: Arc<ServerState>,
    running: Option<Running>,
}

impl MockServer {
    #[must_use]
    pub fn new(config: MockServerConfig) -> Self {
        let state = Arc::new(ServerState::new(config.get_missing_response()));
        Self {
            config,
            state,
            running: None,
        }
    }

    /// Creates and starts a server in one step.
    ///
    /// # Errors
    ///
    /// Same as [`MockServer::start`].
    pub async fn started(config: MockServerConfig) -> MockServerResult<Self> {
        let mut server = Self::new(config);
        server.start().await?;
        Ok(server)
    }

    /// Binds the loopback listener described by the configuration and starts serving.
    ///
    /// # Errors
    ///
    /// [`MockServerError::AlreadyStarted`] on a second call, bind or TLS errors otherwise.
    pub async fn start(&mut self) -> MockServerResult<()> {
        if self.running.is_some() {
            return Err(MockServerError::AlreadyStarted);
        }

        let transport = TcpTransport::bind(
            self.config.get_address_family(),
            self.config.get_port(),
            self.config.get_tls(),
        )
        .await?;
        self.start_on(transport)
    }

    /// Starts serving connections from a caller supplied listener.
    ///
    /// # Errors
    ///
    /// [`MockServerError::AlreadyStarted`] when the server is already running.
    pub fn start_on<L: Listener + 'static>(&mut self, listener: L) -> MockServerResult<()> {
        if self.running.is_some() {
            return Err(MockServerError::AlreadyStarted);
        }

        let listener: SharedListener = Arc::new(listener);
        let local_addr = listener.local_addr();
        let secure = listener.is_secure();
        let handle = tokio::spawn(server_loop::run(Arc::clone(&self.state), listener));

        tracing::info!("Mock server listening on {} (secure: {})", local_addr, secure);
        self.running = Some(Running {
            local_addr,
            secure,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Queues a response built from its parts.
    pub fn enqueue<I, K, V>(
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
        self.state
            .resolver
            .queue()
            .enqueue_parts(body, status, headers, delay);
    }

    pub fn enqueue_response(&self, spec: ResponseSpec) {
        self.state.resolver.queue().enqueue(spec);
    }

    /// Installs `dispatcher`, replacing any previous one. While installed, queued and
    /// default responses are not used.
    pub fn set_dispatcher<D: Dispatcher + 'static>(&self, dispatcher: D) {
        self.state.resolver.set_dispatcher(Some(Arc::new(dispatcher)));
    }

    /// Removes the dispatcher, going back to queued responses.
    pub fn clear_dispatcher(&self) {
        self.state.resolver.set_dispatcher(None);
    }

    /// Response served whenever the queue is empty.
    pub fn set_default_response(&self, spec: ResponseSpec) {
        self.state.resolver.queue().set_default(Some(spec));
    }

    pub fn clear_default_response(&self) {
        self.state.resolver.queue().set_default(None);
    }

    /// Oldest recorded request, without waiting.
    ///
    /// # Errors
    ///
    /// [`MockServerError::EmptyLog`] when nothing is recorded.
    pub fn take_request(&self) -> MockServerResult<RecordedRequest> {
        self.state.log.take()
    }

    /// Oldest recorded request, waiting up to `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// [`MockServerError::EmptyLog`] when the timeout passes with nothing recorded.
    pub async fn take_request_within(&self, timeout: Duration) -> MockServerResult<RecordedRequest> {
        self.state.log.take_within(timeout).await
    }

    /// Requests accepted so far, whether or not a response could be found for them.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.request_count()
    }

    #[must_use]
    pub fn pending_responses(&self) -> usize {
        self.state.resolver.queue().len()
    }

    /// # Errors
    ///
    /// [`MockServerError::NotStarted`] before [`MockServer::start`].
    pub fn local_addr(&self) -> MockServerResult<SocketAddr> {
        self.running
            .as_ref()
            .map(|running| running.local_addr)
            .ok_or(MockServerError::NotStarted)
    }

    /// # Errors
    ///
    /// [`MockServerError::NotStarted`] before [`MockServer::start`].
    pub fn port(&self) -> MockServerResult<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    /// # Errors
    ///
    /// [`MockServerError::NotStarted`] before [`MockServer::start`].
    pub fn host(&self) -> MockServerResult<String> {
        self.local_addr().map(|addr| addr.ip().to_string())
    }

    /// # Errors
    ///
    /// [`MockServerError::NotStarted`] before [`MockServer::start`].
    pub fn is_secure(&self) -> MockServerResult<bool> {
        self.running
            .as_ref()
            .map(|running| running.secure)
            .ok_or(MockServerError::NotStarted)
    }

    /// Base URL with a trailing slash, e.g. `http://127.0.0.1:54321/`.
    ///
    /// # Errors
    ///
    /// [`MockServerError::NotStarted`] before [`MockServer::start`].
    pub fn base_url(&self) -> MockServerResult<String> {
        let scheme = if self.is_secure()? { "https" } else { "http" };
        Ok(format!("{scheme}://{}/", self.local_addr()?))
    }

    /// Full URL for `path` on this server.
    ///
    /// # Errors
    ///
    /// [`MockServerError::NotStarted`] before [`MockServer::start`].
    pub fn url(&self, path: &str) -> MockServerResult<String> {
        let base = self.base_url()?;
        Ok(format!("{base}{}", path.trim_start_matches('/')))
    }

    /// Whether an exchange stopped the server because no response was available
    /// (only with [`crate::MissingResponsePolicy::TerminateServer`]).
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    /// Drains the errors of connections that failed since the last call.
    #[must_use]
    pub fn take_connection_errors(&self) -> Vec<MockServerError> {
        self.state.take_connection_errors()
    }

    /// Stops accepting connections and waits for the accept loop to end. In-flight
    /// exchanges finish on their own. Does nothing before [`MockServer::start`] or once
    /// already shut down.
    ///
    /// # Errors
    ///
    /// [`MockServerError::NoResponseAvailable`] when an exchange terminated the server,
    /// or the error that ended the accept loop.
    pub async fn shutdown(&mut self) -> MockServerResult<()> {
        let Some(handle) = self.running.as_mut().and_then(|running| running.handle.take()) else {
            return Ok(());
        };

        self.state.signal_stop();
        handle.await?
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if !self.state.is_stopping() {
            self.state.signal_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{AddressFamily, Incoming};
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::{mpsc, Mutex};

    /// Listener handing out in-memory streams pushed through a channel.
    struct DuplexListener {
        connections: Mutex<mpsc::Receiver<DuplexStream>>,
    }

    #[async_trait]
    impl Listener for DuplexListener {
        async fn accept(&self) -> MockServerResult<Incoming> {
            match self.connections.lock().await.recv().await {
                Some(stream) => Ok(Incoming::ready(None, stream)),
                None => std::future::pending().await,
            }
        }

        fn local_addr(&self) -> SocketAddr {
            SocketAddr::from(([127, 0, 0, 1], 0))
        }

        fn is_secure(&self) -> bool {
            false
        }
    }

    #[test]
    fn observers_fail_before_start() {
        let server = MockServer::new(MockServerConfig::new());
        assert!(matches!(server.port(), Err(MockServerError::NotStarted)));
        assert!(matches!(server.base_url(), Err(MockServerError::NotStarted)));
        assert_eq!(server.request_count(), 0);
    }

    #[test]
    fn responses_can_be_scripted_before_start() {
        let server = MockServer::new(MockServerConfig::new());
        server.enqueue("one", 200, None::<[(&str, &str); 0]>, None);
        server.enqueue_response(ResponseSpec::with_status(204));
        assert_eq!(server.pending_responses(), 2);
    }

    #[tokio::test]
    async fn base_url_reflects_bound_address() {
        let mut server = MockServer::new(MockServerConfig::new());
        server.start().await.unwrap();

        let port = server.port().unwrap();
        assert_ne!(port, 0);
        assert_eq!(server.host().unwrap(), "127.0.0.1");
        assert_eq!(server.base_url().unwrap(), format!("http://127.0.0.1:{port}/"));
        assert_eq!(
            server.url("/api/users").unwrap(),
            format!("http://127.0.0.1:{port}/api/users")
        );
        assert!(!server.is_secure().unwrap());

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn ipv6_server_brackets_host_in_url() {
        let config = MockServerConfig::new().address_family(AddressFamily::Ipv6);
        let Ok(mut server) = MockServer::started(config).await else {
            // Hosts without IPv6 loopback cannot run this check.
            return;
        };

        assert_eq!(server.host().unwrap(), "::1");
        assert!(server.base_url().unwrap().starts_with("http://[::1]:"));
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn starting_twice_is_rejected() {
        let mut server = MockServer::started(MockServerConfig::new()).await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(MockServerError::AlreadyStarted)
        ));
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_twice_is_harmless() {
        let mut server = MockServer::started(MockServerConfig::new()).await.unwrap();
        server.shutdown().await.unwrap();
        server.shutdown().await.unwrap();
    }

    /// WHY: Shutting down a server that never started must not poison a later start.
    /// WHAT: `shutdown` before `start` is a no-op and the server then serves normally.
    #[tokio::test]
    async fn shutdown_before_start_does_not_prevent_serving() {
        let mut server = MockServer::new(MockServerConfig::new());
        server.shutdown().await.unwrap();

        server.start().await.unwrap();
        server.enqueue_response(ResponseSpec::ok("hi"));

        let response = reqwest::get(server.url("/").unwrap()).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "hi");

        server.shutdown().await.unwrap();
    }

    /// WHY: Any transport can sit behind the accept loop, not only loopback TCP.
    /// WHAT: A request written into an in-memory stream is recorded and answered.
    #[tokio::test]
    async fn custom_listener_serves_exchanges() {
        let (connect, connections) = mpsc::channel(1);
        let mut server = MockServer::new(MockServerConfig::new());
        server
            .start_on(DuplexListener {
                connections: Mutex::new(connections),
            })
            .unwrap();
        server.enqueue_response(ResponseSpec::new("over duplex", 202));

        assert_eq!(server.base_url().unwrap(), "http://127.0.0.1:0/");
        assert!(!server.is_secure().unwrap());

        let (mut client, served) = tokio::io::duplex(4096);
        connect.send(served).await.unwrap();

        client
            .write_all(b"POST /duplex HTTP/1.1\r\nHost: mock\r\nContent-Length: 4\r\nConnection: close\r\n\r\nping")
            .await
            .unwrap();

        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(raw.starts_with("HTTP/1.1 202 Accepted\r\n"), "{raw}");
        assert!(raw.ends_with("over duplex"), "{raw}");

        let record = server.take_request().unwrap();
        assert_eq!(record.method, "POST");
        assert_eq!(record.path(), "/duplex");
        assert_eq!(record.body, "ping");
        assert_eq!(record.peer, None);

        server.shutdown().await.unwrap();
    }
}
