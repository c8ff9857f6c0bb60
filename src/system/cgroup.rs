//! Cgroup discovery and CPU accounting.
//!
//! Supports both cgroup v1 and v2 for reading CPU usage, quota and cpuset
//! limits in containerized environments (Docker, Kubernetes).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::error::{SamplerError, SamplerResult};

const PROC_SELF_CGROUP: &str = "/proc/self/cgroup";
const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Cgroup version detected on the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// cgroup v2 (unified hierarchy)
    V2,
    /// cgroup v1 (legacy hierarchy)
    V1,
}

impl std::fmt::Display for CgroupVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V2 => write!(f, "v2"),
            Self::V1 => write!(f, "v1"),
        }
    }
}

#[derive(Debug, Clone)]
enum Layout {
    /// Controller name → controller directory.
    V1(HashMap<String, PathBuf>),
    /// Directory of the unified hierarchy this process belongs to.
    V2(PathBuf),
}

/// CPU controllers of the cgroup this process runs in.
#[derive(Debug, Clone)]
pub struct Cgroup {
    layout: Layout,
}

impl Cgroup {
    /// Discover the current process's cgroup.
    pub fn detect() -> SamplerResult<Self> {
        Self::detect_at(Path::new(PROC_SELF_CGROUP), Path::new(CGROUP_ROOT))
    }

    /// Discover using explicit `/proc/<pid>/cgroup` and cgroupfs locations.
    pub fn detect_at(proc_cgroup: &Path, root: &Path) -> SamplerResult<Self> {
        let content = read(proc_cgroup)?;

        if root.join("cgroup.controllers").exists() {
            let dir = v2_dir(&content, root);
            debug!(dir = %dir.display(), "Detected cgroup v2 (unified hierarchy)");
            return Ok(Self {
                layout: Layout::V2(dir),
            });
        }

        let controllers = v1_controllers(proc_cgroup, &content, root)?;
        if controllers.is_empty() {
            return Err(SamplerError::Unsupported);
        }
        debug!(
            controllers = ?controllers.keys().collect::<Vec<_>>(),
            "Detected cgroup v1 (legacy hierarchy)"
        );
        Ok(Self {
            layout: Layout::V1(controllers),
        })
    }

    /// Hierarchy version in use.
    pub fn version(&self) -> CgroupVersion {
        match self.layout {
            Layout::V1(_) => CgroupVersion::V1,
            Layout::V2(_) => CgroupVersion::V2,
        }
    }

    /// Cumulative CPU time consumed by the cgroup, in nanoseconds.
    pub fn usage_nanos(&self) -> SamplerResult<u64> {
        match &self.layout {
            Layout::V1(_) => {
                let path = self.v1_file("cpuacct", "cpuacct.usage")?;
                read_u64(&path)
            }
            Layout::V2(dir) => {
                // cpu.stat: "usage_usec 12345\nuser_usec ...\n"
                let path = dir.join("cpu.stat");
                let content = read(&path)?;
                content
                    .lines()
                    .find_map(|line| line.strip_prefix("usage_usec "))
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(|usec| usec * 1_000)
                    .ok_or_else(|| SamplerError::parse(&path, content.trim()))
            }
        }
    }

    /// CPU quota in cores, `None` when unlimited.
    pub fn cpu_quota(&self) -> SamplerResult<Option<f64>> {
        match &self.layout {
            Layout::V1(_) => {
                // Negative quota means unlimited
                let quota_path = self.v1_file("cpu", "cpu.cfs_quota_us")?;
                let quota = read_trimmed(&quota_path)?;
                let quota: i64 = quota
                    .parse()
                    .map_err(|_| SamplerError::parse(&quota_path, quota))?;
                if quota <= 0 {
                    return Ok(None);
                }

                let period_path = self.v1_file("cpu", "cpu.cfs_period_us")?;
                let period = read_u64(&period_path)?;
                if period == 0 {
                    return Ok(None);
                }
                trace!("cgroup v1 cpu quota: {}/{}", quota, period);
                Ok(Some(quota as f64 / period as f64))
            }
            Layout::V2(dir) => {
                // cpu.max: "$MAX $PERIOD" or "max $PERIOD"
                let path = dir.join("cpu.max");
                let content = read_trimmed(&path)?;
                let parts: Vec<&str> = content.split_whitespace().collect();
                match parts.as_slice() {
                    ["max", _] | ["max"] => Ok(None),
                    [max, period] => {
                        let max: f64 = max
                            .parse()
                            .map_err(|_| SamplerError::parse(&path, content.clone()))?;
                        let period: f64 = period
                            .parse()
                            .map_err(|_| SamplerError::parse(&path, content.clone()))?;
                        if max <= 0.0 || period <= 0.0 {
                            return Ok(None);
                        }
                        trace!("cgroup v2 cpu.max: {}/{}", max, period);
                        Ok(Some(max / period))
                    }
                    _ => Err(SamplerError::parse(&path, content)),
                }
            }
        }
    }

    /// Number of CPUs in the cgroup's cpuset.
    pub fn cpuset_count(&self) -> SamplerResult<usize> {
        let path = match &self.layout {
            Layout::V1(_) => self.v1_file("cpuset", "cpuset.cpus")?,
            Layout::V2(dir) => dir.join("cpuset.cpus.effective"),
        };
        let content = read_trimmed(&path)?;
        parse_cpu_list(&content).ok_or_else(|| SamplerError::parse(&path, content))
    }

    /// Cores available to this cgroup.
    ///
    /// Quota if set, else cpuset size, else the machine's logical CPU count.
    pub fn effective_cores(&self) -> f64 {
        if let Ok(Some(quota)) = self.cpu_quota() {
            return quota;
        }
        match self.cpuset_count() {
            Ok(n) if n > 0 => n as f64,
            _ => num_cpus::get() as f64,
        }
    }

    fn v1_file(&self, controller: &str, file: &str) -> SamplerResult<PathBuf> {
        match &self.layout {
            Layout::V1(controllers) => controllers
                .get(controller)
                .map(|dir| dir.join(file))
                .ok_or(SamplerError::Unsupported),
            Layout::V2(_) => Err(SamplerError::Unsupported),
        }
    }
}

/// Parse `/proc/self/cgroup` v1 lines: `hierarchy-ID:controller-list:path`.
///
/// Only controllers whose list starts with `cpu` are kept; each name in the
/// comma-separated list maps to its own directory under `root`.
fn v1_controllers(
    source: &Path,
    content: &str,
    root: &Path,
) -> SamplerResult<HashMap<String, PathBuf>> {
    let mut controllers = HashMap::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let cols: Vec<&str> = line.splitn(3, ':').collect();
        if cols.len() != 3 {
            return Err(SamplerError::parse(source, line));
        }
        let subsys = cols[1];
        if !subsys.starts_with("cpu") {
            continue;
        }
        for name in subsys.split(',') {
            controllers.insert(name.to_string(), root.join(name));
        }
    }
    Ok(controllers)
}

/// Directory of the unified hierarchy from the `0::<path>` line.
fn v2_dir(content: &str, root: &Path) -> PathBuf {
    content
        .lines()
        .find_map(|line| line.strip_prefix("0::"))
        .map(|p| root.join(p.trim().trim_start_matches('/')))
        .filter(|dir| dir.join("cpu.stat").exists())
        .unwrap_or_else(|| root.to_path_buf())
}

/// Count CPUs in a list such as `0-3,6,8-9`.
pub fn parse_cpu_list(list: &str) -> Option<usize> {
    let mut count = 0;
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.trim().parse().ok()?;
                let hi: usize = hi.trim().parse().ok()?;
                if hi < lo {
                    return None;
                }
                count += hi - lo + 1;
            }
            None => {
                part.trim().parse::<usize>().ok()?;
                count += 1;
            }
        }
    }
    Some(count)
}

fn read(path: &Path) -> SamplerResult<String> {
    fs::read_to_string(path).map_err(|source| SamplerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_trimmed(path: &Path) -> SamplerResult<String> {
    read(path).map(|s| s.trim().to_string())
}

fn read_u64(path: &Path) -> SamplerResult<u64> {
    let value = read_trimmed(path)?;
    value
        .parse()
        .map_err(|_| SamplerError::parse(path, value))
}
