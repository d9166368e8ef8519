//! Tracing setup for binaries and ad-hoc debugging.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs an env-filtered fmt subscriber. Does nothing if a global
/// subscriber is already set, so it is safe to call more than once.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autosignals=info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    if subscriber.try_init().is_ok() {
        tracing::debug!("tracing initialized");
    }
}
