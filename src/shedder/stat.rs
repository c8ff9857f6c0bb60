//! Shedding statistics.
//!
//! Counts total, passed and dropped requests and logs a snapshot once per
//! interval. Purely observational: nothing here feeds back into decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::context::ShedderContext;

/// Default reporting interval.
pub const STAT_INTERVAL: Duration = Duration::from_secs(60);

/// Counter values for one reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatSnapshot {
    pub total: u64,
    pub pass: u64,
    pub drop: u64,
}

/// Per-middleware shedding counters.
pub struct ShedderStat {
    name: String,
    total: AtomicU64,
    pass: AtomicU64,
    drop: AtomicU64,
    ctx: Arc<ShedderContext>,
}

impl ShedderStat {
    pub fn new(name: impl Into<String>, ctx: Arc<ShedderContext>) -> Self {
        Self {
            name: name.into(),
            total: AtomicU64::new(0),
            pass: AtomicU64::new(0),
            drop: AtomicU64::new(0),
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn incr_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_pass(&self) {
        self.pass.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_drop(&self) {
        self.drop.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values without resetting them.
    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            total: self.total.load(Ordering::Relaxed),
            pass: self.pass.load(Ordering::Relaxed),
            drop: self.drop.load(Ordering::Relaxed),
        }
    }

    /// Swap every counter to zero and return the old values.
    pub fn reset(&self) -> StatSnapshot {
        StatSnapshot {
            total: self.total.swap(0, Ordering::Relaxed),
            pass: self.pass.swap(0, Ordering::Relaxed),
            drop: self.drop.swap(0, Ordering::Relaxed),
        }
    }

    /// Reset the counters and log the interval's values when stat logging
    /// is enabled.
    pub fn report(&self) -> StatSnapshot {
        let st = self.reset();
        if !self.ctx.stat_logging_enabled() {
            return st;
        }

        let cpu = self.ctx.cpu_usage();
        if st.drop == 0 {
            info!(
                target: "shedder::stat",
                name = %self.name,
                cpu,
                total = st.total,
                pass = st.pass,
                drop = st.drop,
                "({}) shedding_stat, cpu: {}, total: {}, pass: {}, drop: {}",
                self.name, cpu, st.total, st.pass, st.drop
            );
        } else {
            warn!(
                target: "shedder::stat",
                name = %self.name,
                cpu,
                total = st.total,
                pass = st.pass,
                drop = st.drop,
                "({}) shedding_stat_drop, cpu: {}, total: {}, pass: {}, drop: {}",
                self.name, cpu, st.total, st.pass, st.drop
            );
        }
        st
    }

    /// Report every `period` until the stat is dropped.
    ///
    /// Must be called from within a tokio runtime. The task holds only a weak
    /// reference and exits once every other handle is gone.
    pub fn start(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(run(weak, period))
    }
}

async fn run(stat: Weak<ShedderStat>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match stat.upgrade() {
            Some(stat) => {
                stat.report();
            }
            None => break,
        }
    }
}

impl std::fmt::Debug for ShedderStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShedderStat")
            .field("name", &self.name)
            .field("counters", &self.snapshot())
            .finish()
    }
}
