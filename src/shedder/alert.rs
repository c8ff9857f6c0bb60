//! Shed alerts.

use std::fmt;

use serde::Serialize;
use tracing::error;

/// Snapshot of the decision inputs at the moment a request was shed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShedAlert {
    pub reason: &'static str,
    /// Smoothed CPU usage, per-mille.
    pub cpu: u64,
    pub max_pass: u64,
    /// Minimum average latency in milliseconds.
    pub min_rt: f64,
    pub hot: bool,
    pub flying: i64,
    pub avg_flying: f64,
}

impl fmt::Display for ShedAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, cpu: {}, maxPass: {}, minRt: {:.2}, hot: {}, flying: {}, avgFlying: {:.2}",
            self.reason,
            self.cpu,
            self.max_pass,
            self.min_rt,
            self.hot,
            self.flying,
            self.avg_flying
        )
    }
}

/// Destination for shed alerts.
///
/// Called synchronously on the request path, so implementations must not
/// block. Rate limiting belongs to the sink.
pub trait AlertSink: Send + Sync {
    fn report(&self, alert: &ShedAlert);
}

/// Emits alerts as `tracing` error events under the `shedder::alert` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn report(&self, alert: &ShedAlert) {
        error!(
            target: "shedder::alert",
            reason = alert.reason,
            cpu = alert.cpu,
            max_pass = alert.max_pass,
            min_rt = alert.min_rt,
            hot = alert.hot,
            flying = alert.flying,
            avg_flying = alert.avg_flying,
            "{}",
            alert
        );
    }
}
