//! Tracing subscriber setup.
//!
//! Log verbosity follows `RUST_LOG` (default `info`); the output format follows `log_format` in the
//! configuration: human-readable for terminals, one JSON object per line for log shippers.

use crate::config::LogFormat;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init()?,
    }

    info!(?format, "Telemetry initialized");
    Ok(())
}
