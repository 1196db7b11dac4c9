// linkline/crates/linkline-gateway/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber. `RUST_LOG` takes precedence over the
/// configured level; calling this twice keeps the first subscriber.
pub fn init_tracing(default_level: &str) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_lowercase());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
