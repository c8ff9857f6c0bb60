//! Shedder configuration.

use std::time::Duration;

use super::parse::{env_bool, env_duration, env_parse, EnvSource, ProcessEnv};
use super::ConfigError;
use crate::error::Error;
use crate::shedder::{
    ShedderOptions, DEFAULT_BUCKETS, DEFAULT_CPU_THRESHOLD, DEFAULT_WINDOW, STAT_INTERVAL,
};
use crate::system::MAX_CPU_USAGE;

/// Shedder configuration loaded from environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShedderConfig {
    /// Shedding enabled (SHEDDER_ENABLED). When false every shedder is a no-op.
    pub enabled: bool,
    /// Total statistics window (SHEDDER_WINDOW).
    pub window: Duration,
    /// Buckets per window (SHEDDER_BUCKETS).
    pub buckets: usize,
    /// CPU threshold in per-mille (SHEDDER_CPU_THRESHOLD).
    pub cpu_threshold: u64,
    /// Periodic stat logging (SHEDDER_STAT_LOG).
    pub stat_log: bool,
    /// Stat reporting interval (SHEDDER_STAT_INTERVAL).
    pub stat_interval: Duration,
}

impl Default for ShedderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: DEFAULT_WINDOW,
            buckets: DEFAULT_BUCKETS,
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
            stat_log: true,
            stat_interval: STAT_INTERVAL,
        }
    }
}

impl ShedderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }

    /// Load configuration from an explicit source.
    pub fn from_source(src: &dyn EnvSource) -> Result<Self, ConfigError> {
        let window = env_duration(src, "SHEDDER_WINDOW", "5s")?.ok_or_else(|| {
            ConfigError::Invalid {
                key: "SHEDDER_WINDOW".into(),
                message: "window cannot be disabled".into(),
            }
        })?;

        let stat_interval = env_duration(src, "SHEDDER_STAT_INTERVAL", "1m")?
            .unwrap_or(STAT_INTERVAL);

        let config = Self {
            enabled: env_bool(src, "SHEDDER_ENABLED", true),
            window,
            buckets: env_parse(src, "SHEDDER_BUCKETS", DEFAULT_BUCKETS)?,
            cpu_threshold: env_parse(src, "SHEDDER_CPU_THRESHOLD", DEFAULT_CPU_THRESHOLD)?,
            stat_log: env_bool(src, "SHEDDER_STAT_LOG", true),
            stat_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot build a shedder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_threshold > MAX_CPU_USAGE {
            return Err(ConfigError::Invalid {
                key: "SHEDDER_CPU_THRESHOLD".into(),
                message: format!("must be between 0 and {}", MAX_CPU_USAGE),
            });
        }
        if let Err(e) = self.options().validate() {
            let key = match e {
                Error::InvalidConfig { field: "window", .. } => "SHEDDER_WINDOW",
                _ => "SHEDDER_BUCKETS",
            };
            return Err(ConfigError::Invalid {
                key: key.into(),
                message: e.to_string(),
            });
        }
        Ok(())
    }

    /// Options for normal-priority shedders.
    pub fn options(&self) -> ShedderOptions {
        ShedderOptions::default()
            .with_window(self.window)
            .with_buckets(self.buckets)
            .with_cpu_threshold(self.cpu_threshold)
    }

    /// Options for high-priority shedders.
    ///
    /// The threshold sits halfway between the normal one and full scale, so
    /// priority traffic is shed only after normal traffic.
    pub fn priority_options(&self) -> ShedderOptions {
        self.options()
            .with_cpu_threshold((self.cpu_threshold + MAX_CPU_USAGE) / 2)
    }
}
