//! System CPU measurement.
//!
//! Provides cgroup-aware CPU usage sampling for Kubernetes environments.
//!
//! # Cgroup Support
//!
//! - **cgroup v2**: Modern unified hierarchy (default on newer kernels)
//! - **cgroup v1**: Legacy hierarchy (still common in production)
//!
//! Without a CPU controller the sampler falls back to the process's own CPU
//! time from `getrusage`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_shedder::system::{CpuProvider, CpuSampler};
//!
//! let sampler = Arc::new(CpuSampler::new());
//! sampler.start();
//! println!("CPU: {}‰", sampler.cpu_usage());
//! ```

mod cgroup;
mod cpu;
mod error;

pub use cgroup::{parse_cpu_list, Cgroup, CgroupVersion};
pub use cpu::{
    CpuProvider, CpuSampler, CpuTimeSource, FixedCpu, ProcessCpuTime, CPU_REFRESH_INTERVAL,
    MAX_CPU_USAGE,
};
pub use error::{SamplerError, SamplerResult};
