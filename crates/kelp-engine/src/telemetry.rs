//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install a console `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Safe to call more than once:
/// only the first call installs a subscriber, later calls return `false`.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
