//! Shared fixtures for integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_shedder::clock::ManualClock;
use tokio_shedder::shedder::{AlertSink, ShedAlert};
use tokio_shedder::system::FixedCpu;
use tokio_shedder::{ShedderContext, ShedderOptions};

/// Alert sink that keeps every alert.
#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<ShedAlert>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<ShedAlert> {
        self.alerts.lock().unwrap().last().cloned()
    }
}

impl AlertSink for RecordingSink {
    fn report(&self, alert: &ShedAlert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

/// Context with simulated time and CPU.
pub struct TestEnv {
    pub ctx: Arc<ShedderContext>,
    pub clock: Arc<ManualClock>,
    pub cpu: Arc<FixedCpu>,
    pub alerts: Arc<RecordingSink>,
}

impl TestEnv {
    pub fn new(cpu: u64) -> Self {
        let clock = Arc::new(ManualClock::new());
        let cpu = Arc::new(FixedCpu::new(cpu));
        let alerts = Arc::new(RecordingSink::default());
        let ctx = ShedderContext::builder()
            .clock(clock.clone())
            .cpu(cpu.clone())
            .alert_sink(alerts.clone())
            .stat_logging(false)
            .build();
        Self {
            ctx,
            clock,
            cpu,
            alerts,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

/// One second split into ten 100ms buckets, 90% threshold.
pub fn fast_options() -> ShedderOptions {
    ShedderOptions::default()
        .with_window(Duration::from_secs(1))
        .with_buckets(10)
        .with_cpu_threshold(900)
}
