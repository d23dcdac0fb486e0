//! Tracing initialization
//!
//! Log level comes from `RUST_LOG`; without it the vigil crates log at `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Targets match by prefix, so `vigil` covers the binary and every `vigil_*` crate
pub const DEFAULT_FILTER: &str = "vigil=info,rdkafka=warn,sqlx=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the global subscriber. `json` switches to one JSON object per line.
///
/// Fails if a global subscriber is already set.
pub fn init_telemetry(service_name: &str, json: bool) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter());

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    tracing::info!(service = %service_name, json, "Telemetry initialized");
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
