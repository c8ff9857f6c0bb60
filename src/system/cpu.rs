//! CPU usage sampling.
//!
//! A [`CpuSampler`] reads the cumulative CPU time of the process (or of its
//! cgroup) every 250ms and keeps an exponentially smoothed usage value in
//! per-mille (0–1000). Readers only perform one atomic load.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::cgroup::Cgroup;
use super::error::{SamplerError, SamplerResult};
use crate::clock::{Clock, SystemClock};

/// Interval between two CPU samples.
pub const CPU_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Weight of the previous value in the smoothed usage.
const BETA: f64 = 0.95;

/// Full scale of a per-mille value.
pub const MAX_CPU_USAGE: u64 = 1000;

/// Source of the CPU usage figure consulted by shedders.
pub trait CpuProvider: Send + Sync {
    /// Current CPU usage in per-mille (0–1000).
    fn cpu_usage(&self) -> u64;
}

/// CPU provider pinned to a settable value.
///
/// Useful for tests and for platforms where the load signal comes from
/// somewhere else.
#[derive(Debug, Default)]
pub struct FixedCpu {
    usage: AtomicU64,
}

impl FixedCpu {
    pub fn new(usage: u64) -> Self {
        Self {
            usage: AtomicU64::new(usage.min(MAX_CPU_USAGE)),
        }
    }

    pub fn set(&self, usage: u64) {
        self.usage.store(usage.min(MAX_CPU_USAGE), Ordering::Relaxed);
    }
}

impl CpuProvider for FixedCpu {
    fn cpu_usage(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }
}

/// Cumulative CPU time counter.
pub trait CpuTimeSource: Send {
    /// CPU time consumed so far, in nanoseconds.
    fn usage_nanos(&mut self) -> SamplerResult<u64>;

    /// Number of cores the consumption is measured against.
    fn cores(&self) -> f64;
}

impl CpuTimeSource for Cgroup {
    fn usage_nanos(&mut self) -> SamplerResult<u64> {
        Cgroup::usage_nanos(self)
    }

    fn cores(&self) -> f64 {
        self.effective_cores()
    }
}

/// Process CPU time from `getrusage(RUSAGE_SELF)`.
#[derive(Debug, Clone, Copy)]
pub struct ProcessCpuTime {
    cores: f64,
}

impl ProcessCpuTime {
    pub fn new() -> Self {
        Self {
            cores: num_cpus::get() as f64,
        }
    }
}

impl Default for ProcessCpuTime {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuTimeSource for ProcessCpuTime {
    #[cfg(unix)]
    fn usage_nanos(&mut self) -> SamplerResult<u64> {
        // SAFETY: getrusage only writes into the zeroed struct we pass.
        let usage = unsafe {
            let mut usage: libc::rusage = std::mem::zeroed();
            if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
                return Err(SamplerError::Io {
                    path: "getrusage".into(),
                    source: std::io::Error::last_os_error(),
                });
            }
            usage
        };

        let nanos = |tv: libc::timeval| tv.tv_sec as u64 * 1_000_000_000 + tv.tv_usec as u64 * 1_000;
        Ok(nanos(usage.ru_utime) + nanos(usage.ru_stime))
    }

    #[cfg(not(unix))]
    fn usage_nanos(&mut self) -> SamplerResult<u64> {
        Err(SamplerError::Unsupported)
    }

    fn cores(&self) -> f64 {
        self.cores
    }
}

struct SampleState {
    source: Box<dyn CpuTimeSource>,
    cores: f64,
    prev_total: Option<u64>,
    prev_time: Instant,
}

/// Background CPU sampler with an EWMA-smoothed reading.
pub struct CpuSampler {
    state: Mutex<SampleState>,
    usage: AtomicU64,
    running: AtomicBool,
    /// Bumped by every start and stop; a loop only ticks while it owns the
    /// current generation.
    generation: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl CpuSampler {
    /// Create a sampler over the current cgroup, or the process when no
    /// cgroup CPU controller is available.
    pub fn new() -> Self {
        match Cgroup::detect() {
            Ok(cgroup) => {
                info!(version = %cgroup.version(), "CPU sampler using cgroup accounting");
                Self::with_source(Box::new(cgroup), Arc::new(SystemClock))
            }
            Err(e) => {
                debug!(error = %e, "No cgroup CPU accounting, sampling process CPU time");
                Self::with_source(Box::new(ProcessCpuTime::new()), Arc::new(SystemClock))
            }
        }
    }

    /// Create a sampler over an explicit source.
    pub fn with_source(mut source: Box<dyn CpuTimeSource>, clock: Arc<dyn Clock>) -> Self {
        let cores = source.cores();
        let prev_total = source.usage_nanos().ok();
        let prev_time = clock.now();
        Self {
            state: Mutex::new(SampleState {
                source,
                cores,
                prev_total,
                prev_time,
            }),
            usage: AtomicU64::new(0),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            clock,
        }
    }

    /// Take one raw sample: usage since the previous sample, in per-mille.
    ///
    /// Returns 0 when the accounting data cannot be read.
    pub fn refresh_cpu_usage(&self) -> u64 {
        self.try_refresh().unwrap_or_else(|e| {
            debug!(error = %e, "CPU sample skipped");
            0
        })
    }

    fn try_refresh(&self) -> SamplerResult<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let total = state.source.usage_nanos()?;

        let prev_total = state.prev_total.replace(total);
        let elapsed = now.saturating_duration_since(state.prev_time);
        state.prev_time = now;

        let Some(prev_total) = prev_total else {
            return Ok(0);
        };
        Ok(per_mille(
            total.saturating_sub(prev_total),
            elapsed,
            state.cores,
        ))
    }

    /// Sample once and fold the result into the smoothed value.
    ///
    /// A failed read keeps the previous smoothed value.
    pub fn tick(&self) {
        match self.try_refresh() {
            Ok(curr) => {
                let prev = self.usage.load(Ordering::Relaxed);
                let smoothed = (prev as f64 * BETA + curr as f64 * (1.0 - BETA)) as u64;
                self.usage.store(smoothed.min(MAX_CPU_USAGE), Ordering::Relaxed);
            }
            Err(e) => debug!(error = %e, "CPU sample skipped"),
        }
    }

    /// Run the sampling loop in the calling task.
    ///
    /// Returns once [`stop`](Self::stop) or a later [`start`](Self::start)
    /// takes over.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut ticker = tokio::time::interval(CPU_REFRESH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.owns(generation) {
                break;
            }
            self.tick();
        }
        debug!("CPU sampler stopped");
    }

    /// Start sampling in the background.
    ///
    /// Spawns on the current tokio runtime, or on a dedicated thread driving
    /// a current-thread runtime when called outside of one. Calling it twice
    /// is a no-op. The loop holds only a weak reference and exits once the
    /// last handle to the sampler is dropped.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let sampler = Arc::downgrade(self);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(run_weak(sampler, generation));
            return;
        }

        let spawned = std::thread::Builder::new()
            .name("cpu-sampler".into())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(run_weak(sampler, generation)),
                    Err(e) => {
                        warn!(error = %e, "Failed to build CPU sampler runtime");
                        if let Some(sampler) = sampler.upgrade() {
                            sampler.stop();
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn CPU sampler thread");
            self.stop();
        }
    }

    /// Stop the sampling loop.
    ///
    /// The loop exits at its next wake-up without taking another sample.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn owns(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Whether the sampling loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuProvider for CpuSampler {
    #[inline]
    fn cpu_usage(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }
}

/// Background loop that never keeps the sampler alive on its own.
async fn run_weak(sampler: Weak<CpuSampler>, generation: u64) {
    let mut ticker = tokio::time::interval(CPU_REFRESH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(sampler) = sampler.upgrade() else {
            debug!("CPU sampler dropped");
            break;
        };
        if !sampler.owns(generation) {
            debug!("CPU sampler stopped");
            break;
        }
        sampler.tick();
    }
}

/// `delta / (elapsed * cores)`, clamped to [0, 1] and scaled to per-mille.
fn per_mille(delta_nanos: u64, elapsed: Duration, cores: f64) -> u64 {
    let capacity = elapsed.as_nanos() as f64 * cores;
    if capacity <= 0.0 {
        return 0;
    }
    let fraction = (delta_nanos as f64 / capacity).clamp(0.0, 1.0);
    (fraction * MAX_CPU_USAGE as f64) as u64
}
