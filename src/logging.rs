//! Optional log output, enabled with the `logging` feature.
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter, e.g. `deferral=debug`.
pub const LOG_ENV: &str = "DEFERRAL_LOG";

/// Installs a stderr subscriber filtered by [`LOG_ENV`] (`warn` if unset).
///
/// Does nothing if a global subscriber is already installed. Worker processes
/// call this on startup, so their logs end up in the stderr the parent
/// captures.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
