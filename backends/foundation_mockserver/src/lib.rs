//! Scriptable HTTP server for integration tests.
//!
//! This crate provides:
//! - **Response queue**: canned responses served in FIFO order, with an optional default
//! - **Dispatcher**: compute each response from the request instead of the queue
//! - **Request log**: every received request, in arrival order, for later assertions
//! - **Response pipeline**: delays, headers, status, and buffered or streamed bodies
//! - **Transport**: IPv4 or IPv6 loopback, plain or TLS
//!
//! # Examples
//!
//! ```rust
//! use foundation_mockserver::{MockServer, MockServerConfig, ResponseSpec};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut server = MockServer::started(MockServerConfig::new()).await.unwrap();
//! server.enqueue_response(ResponseSpec::new("hello", 200).with_header("X-Server", "Mock"));
//!
//! // ... point the client under test at `server.url("/greeting")` ...
//!
//! assert_eq!(server.pending_responses(), 1);
//! server.shutdown().await.unwrap();
//! # });
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod listener;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod request;
pub mod request_log;
pub mod response;
pub mod server;
pub mod tls;

mod server_loop;

pub use config::{MissingResponsePolicy, MockServerConfig};
pub use dispatch::{dispatch_fn, Dispatcher, FnDispatcher, Resolution, Resolver};
pub use errors::{MockServerError, MockServerResult};
pub use listener::{AddressFamily, Incoming, Listener, TcpTransport};
pub use queue::ResponseQueue;
pub use request::RecordedRequest;
pub use request_log::RequestLog;
pub use response::{ChunkSource, ResponseBody, ResponseSpec};
pub use server::MockServer;
pub use tls::TlsIdentity;
