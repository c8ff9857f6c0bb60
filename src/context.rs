//! Shared shedder environment.
//!
//! A [`ShedderContext`] owns everything shedders used to take from
//! process-wide state: the enable switch, the CPU provider, the clock, the
//! alert sink and the stat-logging flag. Independent contexts can coexist in
//! one process.
//!
//! A context built without an explicit CPU provider starts its own
//! [`CpuSampler`]. The sampler runs while the context or any shedder built
//! from it is alive, and stops on its own once all of them are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::ShedderConfig;
use crate::error::Result;
use crate::shedder::{
    AdaptiveShedder, AlertSink, LogAlertSink, NopShedder, Shedder, ShedderOptions,
};
use crate::system::{CpuProvider, CpuSampler};

/// Environment shared by every shedder built from it.
pub struct ShedderContext {
    enabled: AtomicBool,
    stat_logging: AtomicBool,
    cpu: Arc<dyn CpuProvider>,
    sampler: Option<Arc<CpuSampler>>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
}

impl ShedderContext {
    /// Start building a context.
    pub fn builder() -> ShedderContextBuilder {
        ShedderContextBuilder::default()
    }

    /// Context backed by a started system CPU sampler.
    pub fn system() -> Arc<Self> {
        Self::builder().build()
    }

    /// Context honoring the `enabled` and `stat_log` switches of `config`.
    pub fn from_config(config: &ShedderConfig) -> Arc<Self> {
        Self::builder()
            .enabled(config.enabled)
            .stat_logging(config.stat_log)
            .build()
    }

    /// Turn shedding off for every shedder built from now on.
    ///
    /// There is no way back: later constructions yield no-op shedders.
    /// Shedders built earlier keep deciding.
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            info!("Load shedding disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Toggle periodic stat logging.
    pub fn set_stat_logging(&self, enabled: bool) {
        self.stat_logging.store(enabled, Ordering::SeqCst);
    }

    pub fn stat_logging_enabled(&self) -> bool {
        self.stat_logging.load(Ordering::SeqCst)
    }

    pub fn cpu(&self) -> &Arc<dyn CpuProvider> {
        &self.cpu
    }

    /// The sampler this context started, if it started one.
    pub fn sampler(&self) -> Option<&Arc<CpuSampler>> {
        self.sampler.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn alerts(&self) -> &Arc<dyn AlertSink> {
        &self.alerts
    }

    /// Current CPU usage in per-mille.
    pub fn cpu_usage(&self) -> u64 {
        self.cpu.cpu_usage()
    }

    /// Build a shedder, or a no-op one once the context is disabled.
    pub fn new_shedder(&self, options: ShedderOptions) -> Result<Arc<dyn Shedder>> {
        if !self.is_enabled() {
            options.validate()?;
            return Ok(Arc::new(NopShedder));
        }
        Ok(Arc::new(AdaptiveShedder::new(self, options)?))
    }
}

impl std::fmt::Debug for ShedderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShedderContext")
            .field("enabled", &self.is_enabled())
            .field("stat_logging", &self.stat_logging_enabled())
            .field("cpu_usage", &self.cpu_usage())
            .finish()
    }
}

/// Builder for [`ShedderContext`].
pub struct ShedderContextBuilder {
    enabled: bool,
    stat_logging: bool,
    cpu: Option<Arc<dyn CpuProvider>>,
    clock: Option<Arc<dyn Clock>>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl Default for ShedderContextBuilder {
    fn default() -> Self {
        Self {
            enabled: true,
            stat_logging: true,
            cpu: None,
            clock: None,
            alerts: None,
        }
    }
}

impl ShedderContextBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn stat_logging(mut self, enabled: bool) -> Self {
        self.stat_logging = enabled;
        self
    }

    /// Use `cpu` instead of the system sampler.
    pub fn cpu(mut self, cpu: Arc<dyn CpuProvider>) -> Self {
        self.cpu = Some(cpu);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Build the context.
    ///
    /// Without an explicit CPU provider a [`CpuSampler`] is created and
    /// started. Its loop holds only a weak reference, so it ends with the
    /// last context or shedder using it.
    pub fn build(self) -> Arc<ShedderContext> {
        let (cpu, sampler) = match self.cpu {
            Some(cpu) => (cpu, None),
            None => {
                let sampler = Arc::new(CpuSampler::new());
                sampler.start();
                let cpu: Arc<dyn CpuProvider> = sampler.clone();
                (cpu, Some(sampler))
            }
        };

        Arc::new(ShedderContext {
            enabled: AtomicBool::new(self.enabled),
            stat_logging: AtomicBool::new(self.stat_logging),
            cpu,
            sampler,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            alerts: self.alerts.unwrap_or_else(|| Arc::new(LogAlertSink)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::system::FixedCpu;
    use std::time::Duration;

    fn context() -> Arc<ShedderContext> {
        ShedderContext::builder()
            .cpu(Arc::new(FixedCpu::new(100)))
            .build()
    }

    #[test]
    fn test_defaults() {
        let ctx = context();
        assert!(ctx.is_enabled());
        assert!(ctx.stat_logging_enabled());
        assert_eq!(ctx.cpu_usage(), 100);
    }

    #[test]
    fn test_disable_is_sticky() {
        let ctx = context();
        ctx.disable();
        ctx.disable();
        assert!(!ctx.is_enabled());
    }

    #[test]
    fn test_disabled_context_builds_nop_shedders() {
        let ctx = ShedderContext::builder()
            .cpu(Arc::new(FixedCpu::new(1000)))
            .build();
        let before = ctx.new_shedder(ShedderOptions::default()).unwrap();
        assert!(!before.is_noop());

        ctx.disable();
        let after = ctx.new_shedder(ShedderOptions::default()).unwrap();
        assert!(after.is_noop());
        for _ in 0..100 {
            after.allow().unwrap().pass();
        }
    }

    #[test]
    fn test_invalid_options_fail_even_when_disabled() {
        let ctx = ShedderContext::builder()
            .enabled(false)
            .cpu(Arc::new(FixedCpu::new(0)))
            .build();
        let err = ctx
            .new_shedder(ShedderOptions::default().with_buckets(0))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_explicit_provider_starts_no_sampler() {
        assert!(context().sampler().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_context_releases_sampler() {
        let mut samplers = Vec::new();
        for _ in 0..5 {
            let ctx = ShedderContext::system();
            let sampler = ctx.sampler().expect("system context starts a sampler");
            assert!(sampler.is_running());
            samplers.push(Arc::downgrade(sampler));
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(samplers.iter().all(|s| s.upgrade().is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_outlives_context_while_shedders_do() {
        let ctx = ShedderContext::system();
        let shedder = ctx.new_shedder(ShedderOptions::default()).unwrap();
        let sampler = Arc::downgrade(ctx.sampler().unwrap());
        drop(ctx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(sampler.upgrade().is_some());

        drop(shedder);
        assert!(sampler.upgrade().is_none());
    }

    #[test]
    fn test_independent_contexts() {
        let a = context();
        let b = context();
        a.disable();
        assert!(!a.is_enabled());
        assert!(b.is_enabled());
    }
}
