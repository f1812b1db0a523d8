//! Global `tracing` subscriber for opshub-daemon.
//!
//! `[general] log_format` picks the output layer, `log_level` the default
//! filter. A `RUST_LOG` directive wins over `log_level`.

use anyhow::{Result, bail};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use opshub_core::config::GeneralConfig;

/// Install the subscriber. A second call fails.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let output = output_layer(&config.log_format)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install {} subscriber: {}", config.log_format, e))
}

fn output_layer(format: &str) -> Result<Box<dyn Layer<Registry> + Send + Sync>> {
    Ok(match format {
        // one JSON object per line, for log shippers
        "json" => fmt::layer().json().boxed(),
        "pretty" => fmt::layer().pretty().boxed(),
        other => bail!("unknown log format '{}', expected 'json' or 'pretty'", other),
    })
}
