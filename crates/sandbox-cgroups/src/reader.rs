//! Reading CPU, memory and pid counters from a process's cgroup.

use crate::error::Error;
use crate::proc::{CgroupLocation, ProcFs};
use crate::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cumulative counters of one cgroup at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CgroupSample {
    /// CPU time consumed by the cgroup
    pub cpu_usage_ns: u64,
    /// CPU time of the whole host, all cores
    pub system_cpu_ns: u64,
    pub online_cpus: u32,
    pub memory_usage: u64,
    /// Effective limit; unlimited cgroups report host memory
    pub memory_limit: u64,
    pub pids: Option<u64>,
}

/// Reads counters for the cgroup a pid belongs to
#[derive(Debug, Clone)]
pub struct CgroupReader {
    proc: ProcFs,
    cgroup_root: PathBuf,
    clock_ticks: u64,
}

impl Default for CgroupReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CgroupReader {
    /// Reader over the host's `/proc` and `/sys/fs/cgroup`
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys/fs/cgroup", clock_ticks())
    }

    pub fn with_roots(
        proc_root: impl Into<PathBuf>,
        cgroup_root: impl Into<PathBuf>,
        clock_ticks: u64,
    ) -> Self {
        Self {
            proc: ProcFs::new(proc_root),
            cgroup_root: cgroup_root.into(),
            clock_ticks,
        }
    }

    /// Take one sample of the cgroup `pid` belongs to.
    pub fn sample(&self, pid: u32) -> Result<CgroupSample> {
        let location = self.proc.cgroup_of(pid)?;
        let (system_cpu_ns, online_cpus) = self.proc.system_cpu(self.clock_ticks)?;

        let (cpu_usage_ns, memory_usage, raw_limit, pids) = match &location {
            CgroupLocation::V2 { path } => {
                let dir = self.cgroup_root.join(path.trim_start_matches('/'));
                let cpu_usec = read_keyed(&dir.join("cpu.stat"), "usage_usec")?;
                (
                    cpu_usec.saturating_mul(1_000),
                    read_u64(&dir.join("memory.current"))?,
                    read_limit(&dir.join("memory.max"))?,
                    read_optional(&dir.join("pids.current"))?,
                )
            }
            CgroupLocation::V1 { .. } => {
                let dir = |controller: &str| -> Result<PathBuf> {
                    let (mount, path) = location.v1_path(controller).ok_or_else(|| {
                        Error::Metrics(format!("pid {} has no {} cgroup", pid, controller))
                    })?;
                    Ok(self.cgroup_root.join(mount).join(path.trim_start_matches('/')))
                };
                let memory = dir("memory")?;
                let pids = match location.v1_path("pids") {
                    Some(_) => read_optional(&dir("pids")?.join("pids.current"))?,
                    None => None,
                };
                (
                    read_u64(&dir("cpuacct")?.join("cpuacct.usage"))?,
                    read_u64(&memory.join("memory.usage_in_bytes"))?,
                    read_limit(&memory.join("memory.limit_in_bytes"))?,
                    pids,
                )
            }
        };

        // v1 reports "unlimited" as a page-aligned i64::MAX.
        let mem_total = self.proc.mem_total()?;
        let memory_limit = raw_limit.filter(|l| *l < mem_total).unwrap_or(mem_total);

        let sample = CgroupSample {
            cpu_usage_ns,
            system_cpu_ns,
            online_cpus,
            memory_usage,
            memory_limit,
            pids,
        };
        debug!("Sampled cgroup of pid {}: {:?}", pid, sample);
        Ok(sample)
    }
}

/// `_SC_CLK_TCK`, falling back to the near-universal 100.
fn clock_ticks() -> u64 {
    match nix::unistd::sysconf(nix::unistd::SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => ticks as u64,
        _ => 100,
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_u64(path: &Path) -> Result<u64> {
    let text = read_text(path)?;
    text.trim()
        .parse()
        .map_err(|e| Error::parse(path, format!("'{}': {}", text.trim(), e)))
}

fn read_optional(path: &Path) -> Result<Option<u64>> {
    if path.exists() {
        read_u64(path).map(Some)
    } else {
        Ok(None)
    }
}

/// A memory limit file; `max` means unlimited.
fn read_limit(path: &Path) -> Result<Option<u64>> {
    let text = read_text(path)?;
    match text.trim() {
        "max" => Ok(None),
        value => value
            .parse()
            .map(Some)
            .map_err(|e| Error::parse(path, format!("'{}': {}", value, e))),
    }
}

/// Value of `key` in a flat-keyed file such as `cpu.stat`.
fn read_keyed(path: &Path, key: &str) -> Result<u64> {
    let text = read_text(path)?;
    text.lines()
        .filter_map(|line| line.split_once(' '))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| v.trim().parse().ok())
        .ok_or_else(|| Error::parse(path, format!("missing {}", key)))
}
