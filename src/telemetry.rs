//! Tracing setup shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. Logs go to stderr so stdout can carry data.
///
/// `RUST_LOG` overrides `default_directives` when set.
pub fn init_tracing(default_directives: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
