//! Tracing setup for test binaries using the mock server.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_DIRECTIVES: &str = "foundation_mockserver=debug";

/// Installs a global fmt subscriber writing through the test harness' capture.
///
/// `RUST_LOG` overrides the default `foundation_mockserver=debug` filter. Calling it
/// again, or after another subscriber was installed, does nothing.
pub fn init_test_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_test_writer()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::trace!("Global tracing subscriber already installed");
    }
}
