//! Mock server configuration.

use serde::{Deserialize, Serialize};

use crate::errors::MockServerResult;
use crate::listener::AddressFamily;
use crate::tls::TlsIdentity;

/// What an exchange does when resolution finds nothing to serve.
///
/// The request is recorded and counted in every case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingResponsePolicy {
    /// Answer `500 Internal Server Error` and keep serving.
    #[default]
    RespondWithError,
    /// Drop the connection without a response and keep serving.
    CloseConnection,
    /// Stop accepting connections; the error is reported by `MockServer::shutdown`.
    TerminateServer,
}

/// Configuration for a [`crate::MockServer`].
///
/// TLS material is never read from configuration files, attach it with
/// [`MockServerConfig::tls`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MockServerConfig {
    /// Port to bind, 0 for an ephemeral one.
    port: u16,
    address_family: AddressFamily,
    missing_response: MissingResponsePolicy,
    #[serde(skip)]
    tls: Option<TlsIdentity>,
}

impl MockServerConfig {
    /// Creates a configuration with default values.
    ///
    /// Defaults:
    /// - `port`: 0 (ephemeral)
    /// - `address_family`: IPv4
    /// - `missing_response`: [`MissingResponsePolicy::RespondWithError`]
    /// - `tls`: None
    #[must_use]
    pub const fn new() -> Self {
        Self {
            port: 0,
            address_family: AddressFamily::Ipv4,
            missing_response: MissingResponsePolicy::RespondWithError,
            tls: None,
        }
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn address_family(mut self, family: AddressFamily) -> Self {
        self.address_family = family;
        self
    }

    #[must_use]
    pub fn missing_response(mut self, policy: MissingResponsePolicy) -> Self {
        self.missing_response = policy;
        self
    }

    /// Serves over TLS with the given identity.
    #[must_use]
    pub fn tls(mut self, identity: TlsIdentity) -> Self {
        self.tls = Some(identity);
        self
    }

    #[must_use]
    pub const fn get_port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub const fn get_address_family(&self) -> AddressFamily {
        self.address_family
    }

    #[must_use]
    pub const fn get_missing_response(&self) -> MissingResponsePolicy {
        self.missing_response
    }

    #[must_use]
    pub fn get_tls(&self) -> Option<&TlsIdentity> {
        self.tls.as_ref()
    }

    /// Reads a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`crate::MockServerError::Config`] when the text is not a valid configuration.
    pub fn from_toml_str(content: &str) -> MockServerResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// [`crate::MockServerError::Config`] when the file cannot be read or parsed.
    pub fn from_path<V: Into<std::path::PathBuf>>(target: V) -> MockServerResult<Self> {
        let target_path = target.into();
        let content = std::fs::read_to_string(&target_path).map_err(|err| {
            crate::MockServerError::Config(format!("{}: {err}", target_path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}
