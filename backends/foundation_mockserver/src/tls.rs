//! TLS server identity built from raw certificate and key bytes.
//!
//! Loading the bytes from disk is left to the caller. The chain is PEM encoded, leaf first.
//! Without a password the key is a plain PEM private key; with one it must be an
//! `ENCRYPTED PRIVATE KEY` (PKCS#8, PBES2) document.

use core::fmt;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use zeroize::Zeroizing;

use crate::errors::{MockServerError, MockServerResult};

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

#[derive(Clone)]
pub struct TlsIdentity {
    certificate_chain: Vec<u8>,
    private_key: Zeroizing<Vec<u8>>,
    password: Option<Zeroizing<String>>,
}

impl TlsIdentity {
    #[must_use]
    pub fn new(certificate_chain: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            certificate_chain,
            private_key: Zeroizing::new(private_key),
            password: None,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Builds the rustls server configuration for this identity.
    ///
    /// # Errors
    ///
    /// Fails when the chain holds no parsable certificate, the key cannot be read or
    /// decrypted, or rustls rejects the pair.
    pub fn server_config(&self) -> MockServerResult<Arc<ServerConfig>> {
        let certificates = CertificateDer::pem_slice_iter(&self.certificate_chain)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| MockServerError::InvalidCertificate(format!("{err:?}")))?;

        if certificates.is_empty() {
            return Err(MockServerError::InvalidCertificate(
                "certificate chain holds no certificates".to_string(),
            ));
        }

        let private_key = match &self.password {
            Some(password) => decrypt_private_key(&self.private_key, password)?,
            None => PrivateKeyDer::from_pem_slice(&self.private_key)
                .map_err(|err| MockServerError::InvalidPrivateKey(format!("{err:?}")))?,
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certificates, private_key)?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Arc::new(config))
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("certificate_chain_len", &self.certificate_chain.len())
            .field("has_password", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

fn decrypt_private_key(pem: &[u8], password: &str) -> MockServerResult<PrivateKeyDer<'static>> {
    let invalid = |reason: String| MockServerError::InvalidPrivateKey(reason);

    let text = std::str::from_utf8(pem).map_err(|err| invalid(err.to_string()))?;
    let (label, document) =
        pkcs8::der::Document::from_pem(text).map_err(|err| invalid(err.to_string()))?;

    if label != ENCRYPTED_KEY_LABEL {
        return Err(invalid(format!(
            "expected an {ENCRYPTED_KEY_LABEL} document when a password is given, found {label}"
        )));
    }

    let encrypted = pkcs8::EncryptedPrivateKeyInfo::try_from(document.as_bytes())
        .map_err(|err| invalid(err.to_string()))?;
    let decrypted = encrypted
        .decrypt(password.as_bytes())
        .map_err(|err| invalid(err.to_string()))?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        decrypted.as_bytes().to_vec(),
    )))
}
