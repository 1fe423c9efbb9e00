//! Transport seam between the accept loop and the network.
//!
//! WHY: The serving loop only needs "give me the next connection"; whether that is plain
//! TCP or TLS is a construction-time detail.
//!
//! WHAT: [`Listener`] yields [`Incoming`] connections. [`TcpTransport`] is the loopback
//! implementation used by [`crate::MockServer`], with optional TLS.
//!
//! HOW: Accepting and establishing are split. The accept loop only takes the TCP
//! connection; the TLS handshake runs later inside the connection's own task so a slow
//! client cannot stall the loop.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::errors::{MockServerError, MockServerResult};
use crate::tls::TlsIdentity;

/// Byte stream an exchange is served over.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

pub type BoxedIo = Box<dyn Io>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    #[must_use]
    pub fn loopback(self) -> IpAddr {
        match self {
            Self::Ipv4 => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Self::Ipv6 => IpAddr::V6(Ipv6Addr::LOCALHOST),
        }
    }
}

/// An accepted connection that may still need its handshake.
pub struct Incoming {
    peer: Option<SocketAddr>,
    establish: BoxFuture<'static, MockServerResult<BoxedIo>>,
}

impl Incoming {
    pub fn new<F>(peer: Option<SocketAddr>, establish: F) -> Self
    where
        F: std::future::Future<Output = MockServerResult<BoxedIo>> + Send + 'static,
    {
        Self {
            peer,
            establish: establish.boxed(),
        }
    }

    /// An already usable stream.
    pub fn ready<I: Io + 'static>(peer: Option<SocketAddr>, io: I) -> Self {
        Self::new(peer, async move { Ok(Box::new(io) as BoxedIo) })
    }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Completes the connection setup (the TLS handshake when secure).
    ///
    /// # Errors
    ///
    /// [`MockServerError::Handshake`] when the peer fails the handshake.
    pub async fn establish(self) -> MockServerResult<BoxedIo> {
        self.establish.await
    }
}

#[async_trait]
pub trait Listener: Send + Sync {
    /// Waits for the next connection.
    async fn accept(&self) -> MockServerResult<Incoming>;

    fn local_addr(&self) -> SocketAddr;

    fn is_secure(&self) -> bool;
}

/// Loopback TCP listener, TLS when an identity is supplied.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
}

impl TcpTransport {
    /// Binds the loopback address of `family` on `port` (0 picks an ephemeral port).
    ///
    /// # Errors
    ///
    /// [`MockServerError::Bind`] when the address cannot be bound, or a TLS error when the
    /// identity is unusable.
    pub async fn bind(
        family: AddressFamily,
        port: u16,
        identity: Option<&TlsIdentity>,
    ) -> MockServerResult<Self> {
        let tls = identity
            .map(|identity| identity.server_config().map(TlsAcceptor::from))
            .transpose()?;

        let listener = TcpListener::bind(SocketAddr::new(family.loopback(), port))
            .await
            .map_err(MockServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(MockServerError::Bind)?;

        tracing::info!(
            "Bound mock server listener on {} (tls: {})",
            local_addr,
            tls.is_some()
        );

        Ok(Self {
            listener,
            local_addr,
            tls,
        })
    }
}

#[async_trait]
impl Listener for TcpTransport {
    async fn accept(&self) -> MockServerResult<Incoming> {
        let (stream, peer) = self.listener.accept().await.map_err(MockServerError::Accept)?;
        stream.set_nodelay(true).map_err(MockServerError::Accept)?;

        match &self.tls {
            None => Ok(Incoming::ready(Some(peer), stream)),
            Some(acceptor) => {
                let acceptor = acceptor.clone();
                Ok(Incoming::new(Some(peer), async move {
                    let secured = acceptor
                        .accept(stream)
                        .await
                        .map_err(MockServerError::Handshake)?;
                    Ok(Box::new(secured) as BoxedIo)
                }))
            }
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn is_secure(&self) -> bool {
        self.tls.is_some()
    }
}

/// Shared handle to any listener.
pub type SharedListener = Arc<dyn Listener>;
