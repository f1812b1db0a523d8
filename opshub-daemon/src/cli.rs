//! CLI argument definitions for opshub-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use opshub_core::config::OpsHubConfig;
use opshub_core::error::OpsHubError;

/// OpsHub container log ingestion daemon.
///
/// Discovers containers, tails their logs, classifies every line and
/// persists it to per-source log files and the record store.
#[derive(Parser, Debug)]
#[command(name = "opshub-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to opshub.toml configuration file.
    #[arg(short, long, default_value = "/etc/opshub/opshub.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Load the configuration file named by `--config`.
    ///
    /// Precedence is file < environment < CLI flags. Validation runs once,
    /// after every override, so a flag can repair a bad file value.
    pub async fn load_config(&self) -> Result<OpsHubConfig, OpsHubError> {
        let mut config = OpsHubConfig::from_file(&self.config).await?;
        config.apply_env_overrides();
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut OpsHubConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
    }
}
