//! Adaptive load shedder.
//!
//! Sheds only when the process is busy *and* more requests are in flight than
//! the service has shown it can sustain:
//!
//! ```text
//! should_drop = (cpu >= threshold || still_hot) && high_throughput
//!
//! max_flight  = max(1, max_pass * windows_per_second * min_rt_ms / 1000)
//! ```
//!
//! `max_flight` is Little's law over the observed windows: the best
//! throughput seen in one bucket times the best average latency. After a
//! drop the shedder stays hot for one second so a brief CPU dip does not
//! re-admit a burst it just rejected.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::alert::{AlertSink, ShedAlert};
use super::options::ShedderOptions;
use super::promise::Promise;
use super::Shedder;
use crate::clock::Clock;
use crate::collection::RollingWindow;
use crate::context::ShedderContext;
use crate::error::{Error, Result};
use crate::system::CpuProvider;

/// How long the shedder stays hot after dropping a request.
pub const COOL_OFF_DURATION: Duration = Duration::from_secs(1);

/// Minimum average latency assumed before any request has passed.
pub const DEFAULT_MIN_RT: f64 = 1000.0;

/// Weight of the previous value in the smoothed in-flight count.
const FLYING_BETA: f64 = 0.9;

/// Shared decision state behind an [`AdaptiveShedder`] and its promises.
pub(super) struct Core {
    cpu_threshold: u64,
    windows_per_second: f64,
    flying: AtomicI64,
    /// f64 bit pattern.
    avg_flying: AtomicU64,
    /// Reference point for `drop_time`.
    epoch: Instant,
    /// Nanoseconds after `epoch` of the latest drop.
    drop_time: AtomicU64,
    dropped_recently: AtomicBool,
    pass_counter: RollingWindow,
    rt_counter: RollingWindow,
    cpu: Arc<dyn CpuProvider>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
}

/// CPU- and throughput-aware admission controller.
#[derive(Clone)]
pub struct AdaptiveShedder {
    core: Arc<Core>,
}

impl AdaptiveShedder {
    /// Build a shedder using the CPU provider, clock and alert sink of `ctx`.
    ///
    /// Fails on options that cannot describe a window.
    pub fn new(ctx: &ShedderContext, options: ShedderOptions) -> Result<Self> {
        options.validate()?;

        let clock = Arc::clone(ctx.clock());
        let bucket = options.bucket_duration();
        let pass_counter = RollingWindow::with_clock(options.buckets, bucket, clock.clone())?
            .ignore_current_bucket(true);
        let rt_counter = RollingWindow::with_clock(options.buckets, bucket, clock.clone())?
            .ignore_current_bucket(true);

        debug!(
            buckets = options.buckets,
            bucket_ms = bucket.as_millis() as u64,
            cpu_threshold = options.cpu_threshold,
            "Adaptive shedder created"
        );

        Ok(Self {
            core: Arc::new(Core {
                cpu_threshold: options.cpu_threshold,
                windows_per_second: options.windows_per_second(),
                flying: AtomicI64::new(0),
                avg_flying: AtomicU64::new(0f64.to_bits()),
                epoch: clock.now(),
                drop_time: AtomicU64::new(0),
                dropped_recently: AtomicBool::new(false),
                pass_counter,
                rt_counter,
                cpu: Arc::clone(ctx.cpu()),
                clock,
                alerts: Arc::clone(ctx.alerts()),
            }),
        })
    }

    /// CPU threshold in per-mille.
    pub fn cpu_threshold(&self) -> u64 {
        self.core.cpu_threshold
    }

    /// Requests currently admitted and unresolved.
    pub fn flying(&self) -> i64 {
        self.core.flying.load(Ordering::SeqCst)
    }

    /// Smoothed in-flight count.
    pub fn avg_flying(&self) -> f64 {
        self.core.avg_flying()
    }
}

impl Shedder for AdaptiveShedder {
    fn allow(&self) -> Result<Promise> {
        let core = &self.core;
        if core.should_drop() {
            core.record_drop();
            return Err(Error::ServiceOverloaded);
        }

        core.add_flying(1);
        Ok(Promise::new(core.clock.now(), Arc::clone(core)))
    }
}

impl std::fmt::Debug for AdaptiveShedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveShedder")
            .field("cpu_threshold", &self.core.cpu_threshold)
            .field("windows_per_second", &self.core.windows_per_second)
            .field("flying", &self.flying())
            .field("avg_flying", &self.avg_flying())
            .finish()
    }
}

impl Core {
    fn should_drop(&self) -> bool {
        if !(self.system_overloaded() || self.still_hot()) {
            return false;
        }
        if !self.high_thru() {
            return false;
        }

        self.alerts.report(&ShedAlert {
            reason: "dropreq",
            cpu: self.cpu.cpu_usage(),
            max_pass: self.max_pass(),
            min_rt: self.min_rt(),
            hot: self.still_hot(),
            flying: self.flying.load(Ordering::SeqCst),
            avg_flying: self.avg_flying(),
        });
        true
    }

    fn system_overloaded(&self) -> bool {
        self.cpu.cpu_usage() >= self.cpu_threshold
    }

    /// Within the cool-off period of the last drop.
    ///
    /// Clears `dropped_recently` once the period has expired.
    fn still_hot(&self) -> bool {
        if !self.dropped_recently.load(Ordering::Acquire) {
            return false;
        }

        let dropped_at = self.epoch + Duration::from_nanos(self.drop_time.load(Ordering::Acquire));
        let hot = self.clock.now().saturating_duration_since(dropped_at) < COOL_OFF_DURATION;
        if !hot {
            self.dropped_recently.store(false, Ordering::Release);
        }
        hot
    }

    fn record_drop(&self) {
        let since_epoch = self.clock.now().saturating_duration_since(self.epoch);
        let nanos = u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX);
        self.drop_time.store(nanos, Ordering::Release);
        self.dropped_recently.store(true, Ordering::Release);
    }

    /// Both the smoothed and the instantaneous in-flight counts exceed what
    /// the service has shown it can sustain.
    fn high_thru(&self) -> bool {
        let max_flight = self.max_flight();
        let avg_flying = self.avg_flying();
        let flying = self.flying.load(Ordering::SeqCst) as f64;
        avg_flying > max_flight && flying > max_flight
    }

    fn max_flight(&self) -> f64 {
        let estimate =
            self.max_pass() as f64 * self.windows_per_second * (self.min_rt() / 1000.0);
        estimate.max(1.0)
    }

    /// Most passes recorded in one complete bucket, at least 1.
    fn max_pass(&self) -> u64 {
        let mut result = 1.0f64;
        self.pass_counter.reduce(|b| {
            if b.sum > result {
                result = b.sum;
            }
        });
        result as u64
    }

    /// Lowest per-bucket average latency in milliseconds.
    fn min_rt(&self) -> f64 {
        let mut result = DEFAULT_MIN_RT;
        self.rt_counter.reduce(|b| {
            if b.count == 0 {
                return;
            }
            let avg = (b.sum / b.count as f64).round();
            if avg < result {
                result = avg;
            }
        });
        result
    }

    fn avg_flying(&self) -> f64 {
        f64::from_bits(self.avg_flying.load(Ordering::SeqCst))
    }

    /// Adjust the in-flight count.
    ///
    /// The smoothed average only moves on release, so bursts are admitted at
    /// once while the estimate decays slowly afterwards.
    fn add_flying(&self, delta: i64) {
        let flying = self.flying.fetch_add(delta, Ordering::SeqCst) + delta;
        if delta < 0 {
            let _ = self
                .avg_flying
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                    let avg = f64::from_bits(bits);
                    let next = avg * FLYING_BETA + flying as f64 * (1.0 - FLYING_BETA);
                    Some(next.to_bits())
                });
        }
    }

    pub(super) fn on_pass(&self, start: Instant) {
        let rt = self.clock.now().saturating_duration_since(start).as_secs_f64() * 1000.0;
        self.add_flying(-1);
        self.rt_counter.add(rt.ceil());
        self.pass_counter.add(1.0);
    }

    pub(super) fn on_fail(&self) {
        self.add_flying(-1);
    }
}
