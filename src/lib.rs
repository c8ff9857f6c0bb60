//! tokio_shedder - Adaptive load shedding for Rust services.
//!
//! This crate protects a service from overload by rejecting requests early
//! while the machine is saturated. Admission combines a smoothed, cgroup-aware
//! CPU reading with Little's law over recent throughput and latency.
//!
//! # Features
//!
//! - **CPU sampling**: cgroup v1/v2 aware, with a process-time fallback
//! - **Adaptive shedder**: CPU threshold, in-flight estimate and cool-off
//! - **Rolling windows**: Bucketed pass and latency statistics
//! - **Shedder groups**: Lazily created shedders keyed by name
//! - **HTTP middleware**: 503 rejection for `http` request handlers
//! - **Structured logging**: JSON stat and alert lines via tracing
//!
//! # Architecture
//!
//! Shedders are built from a [`ShedderContext`], which owns the CPU provider,
//! the clock, the alert sink and the enable switch:
//!
//! - [`AdaptiveShedder`] - Overload detection with promise-based feedback
//! - [`NopShedder`](shedder::NopShedder) - Admits everything once disabled
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_shedder::{Config, ShedderContext};
//!
//! let config = Config::from_env()?;
//! tokio_shedder::logging::init(&config.logging)?;
//!
//! let ctx = ShedderContext::from_config(&config.shedder);
//! let shedder = ctx.new_shedder(config.shedder.options())?;
//!
//! let promise = shedder.allow()?;
//! promise.pass();
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod shedder;
pub mod system;

// Re-exports for convenience
pub use config::Config;
pub use context::ShedderContext;
pub use error::{Error, Result};
pub use shedder::{AdaptiveShedder, Promise, Shedder, ShedderGroup, ShedderOptions, ShedderStat};
