//! Shedder construction options.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::system::MAX_CPU_USAGE;

/// Default total span of the statistics windows.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
/// Default number of buckets per window.
pub const DEFAULT_BUCKETS: usize = 50;
/// Default CPU threshold, 90.0%.
pub const DEFAULT_CPU_THRESHOLD: u64 = 900;

/// Window shape and CPU threshold of an adaptive shedder.
///
/// ```rust,ignore
/// let options = ShedderOptions::default()
///     .with_window(Duration::from_secs(10))
///     .with_buckets(100)
///     .with_cpu_threshold(800);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShedderOptions {
    /// Total span covered by the pass and latency windows.
    pub window: Duration,
    /// Number of buckets the window is split into.
    pub buckets: usize,
    /// CPU usage (per-mille) at or above which the system counts as overloaded.
    pub cpu_threshold: u64,
}

impl Default for ShedderOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            buckets: DEFAULT_BUCKETS,
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
        }
    }
}

impl ShedderOptions {
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn with_cpu_threshold(mut self, threshold: u64) -> Self {
        self.cpu_threshold = threshold;
        self
    }

    /// Duration of one bucket.
    pub fn bucket_duration(&self) -> Duration {
        match u32::try_from(self.buckets) {
            Ok(n) if n > 0 => self.window / n,
            _ => Duration::ZERO,
        }
    }

    /// Buckets per second of wall time.
    pub fn windows_per_second(&self) -> f64 {
        let nanos = self.bucket_duration().as_nanos();
        if nanos == 0 {
            return 0.0;
        }
        Duration::from_secs(1).as_nanos() as f64 / nanos as f64
    }

    /// Check that the options describe a usable shedder.
    pub fn validate(&self) -> Result<()> {
        if self.buckets < 1 {
            return Err(Error::invalid("buckets", "must be at least 1"));
        }
        if u32::try_from(self.buckets).is_err() {
            return Err(Error::invalid("buckets", "too many buckets"));
        }
        if self.bucket_duration().is_zero() {
            return Err(Error::invalid(
                "window",
                format!(
                    "{:?} is too short for {} buckets",
                    self.window, self.buckets
                ),
            ));
        }
        if self.cpu_threshold > MAX_CPU_USAGE {
            return Err(Error::invalid(
                "cpu threshold",
                format!("{} exceeds {}", self.cpu_threshold, MAX_CPU_USAGE),
            ));
        }
        Ok(())
    }
}
