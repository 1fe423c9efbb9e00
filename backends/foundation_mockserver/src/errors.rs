use derive_more::From;

pub type MockServerResult<T> = std::result::Result<T, MockServerError>;

/// Failures surfaced by the mock server.
///
/// `NoResponseAvailable` and `EmptyLog` are mistakes in how a test scripted the server,
/// everything else is a transport or setup failure.
#[derive(From, Debug)]
pub enum MockServerError {
    /// Resolution found no dispatcher, no queued response and no default.
    #[from(ignore)]
    NoResponseAvailable,

    /// `take_request` was called with nothing recorded.
    #[from(ignore)]
    EmptyLog,

    #[from(ignore)]
    NotStarted,

    #[from(ignore)]
    AlreadyStarted,

    #[from(ignore)]
    Bind(std::io::Error),

    #[from(ignore)]
    Accept(std::io::Error),

    #[from(ignore)]
    Handshake(std::io::Error),

    Tls(rustls::Error),

    #[from(ignore)]
    InvalidCertificate(String),

    #[from(ignore)]
    InvalidPrivateKey(String),

    #[from(ignore)]
    InvalidStatus(u16),

    #[from(ignore)]
    InvalidHeader(String),

    #[from(ignore)]
    BodyRead(hyper::Error),

    #[from(ignore)]
    Transport(hyper::Error),

    #[from(ignore)]
    Config(String),

    ServerTask(tokio::task::JoinError),
}

impl std::error::Error for MockServerError {}

impl core::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<toml::de::Error> for MockServerError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for MockServerError {
    fn from(value: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(value.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for MockServerError {
    fn from(value: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(value.to_string())
    }
}

impl MockServerError {
    /// Whether this error comes from how the test scripted the server rather than the network.
    #[must_use]
    pub fn is_scripting_error(&self) -> bool {
        matches!(self, Self::NoResponseAvailable | Self::EmptyLog)
    }
}
