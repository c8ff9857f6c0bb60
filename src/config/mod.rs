//! Configuration module for tokio_shedder.
//!
//! This module provides centralized configuration loading from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_shedder::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("CPU threshold: {}", config.shedder.cpu_threshold);
//! ```

mod error;
mod logging;
mod parse;
mod shedder;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use parse::{parse_duration, EnvSource, ProcessEnv};
pub use shedder::ShedderConfig;

/// Complete library configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Shedder configuration.
    pub shedder: ShedderConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }

    /// Load configuration from an explicit source.
    pub fn from_source(src: &dyn EnvSource) -> Result<Self, ConfigError> {
        Ok(Self {
            shedder: ShedderConfig::from_source(src)?,
            logging: LoggingConfig::from_source(src)?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        if !self.shedder.enabled {
            info!("  Shedding: disabled");
            return;
        }

        let options = self.shedder.options();
        info!(
            "  Window: {:?} ({} buckets of {:?})",
            self.shedder.window,
            self.shedder.buckets,
            options.bucket_duration()
        );
        info!(
            "  CPU threshold: {:.1}% (priority: {:.1}%)",
            self.shedder.cpu_threshold as f64 / 10.0,
            self.shedder.priority_options().cpu_threshold as f64 / 10.0
        );

        if self.shedder.stat_log {
            info!("  Stat log: every {:?}", self.shedder.stat_interval);
        } else {
            info!("  Stat log: disabled");
        }
    }
}
