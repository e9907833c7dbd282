//! Host `/proc` parsing: process cgroup membership and system CPU time.

use crate::error::Error;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a process sits in the cgroup hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupLocation {
    /// Unified hierarchy: one path for every controller.
    V2 { path: String },
    /// Legacy hierarchy: one path per mounted controller directory.
    V1 { controllers: Vec<(String, String)> },
}

impl CgroupLocation {
    /// Path of `controller` in a v1 hierarchy, with the directory name it is
    /// mounted under (`cpu,cpuacct` for `cpuacct`).
    pub fn v1_path(&self, controller: &str) -> Option<(&str, &str)> {
        match self {
            Self::V1 { controllers } => controllers
                .iter()
                .find(|(names, _)| names.split(',').any(|n| n == controller))
                .map(|(names, path)| (names.as_str(), path.as_str())),
            Self::V2 { .. } => None,
        }
    }
}

/// Reader for a `/proc` tree, rooted at `/proc` outside of tests
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, relative: &str) -> Result<(PathBuf, String)> {
        let path = self.root.join(relative);
        let text = fs::read_to_string(&path).map_err(|e| Error::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok((path, text))
    }

    /// Parse `/proc/<pid>/cgroup`.
    pub fn cgroup_of(&self, pid: u32) -> Result<CgroupLocation> {
        let (_, text) = self.read(&format!("{}/cgroup", pid))?;
        let mut controllers = Vec::new();
        let mut unified = None;

        for line in text.lines() {
            let mut parts = line.splitn(3, ':');
            let (Some(id), Some(names), Some(path)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            if id == "0" && names.is_empty() {
                unified = Some(path.to_string());
            } else if !names.is_empty() && !names.starts_with("name=") {
                controllers.push((names.to_string(), path.to_string()));
            }
        }

        // Hybrid hosts list both; the per-controller hierarchy holds the counters.
        if !controllers.is_empty() {
            Ok(CgroupLocation::V1 { controllers })
        } else if let Some(path) = unified {
            Ok(CgroupLocation::V2 { path })
        } else {
            Err(Error::NoCgroup(pid))
        }
    }

    /// Total CPU time of the host in nanoseconds, and the online CPU count,
    /// from the `cpu` lines of `/proc/stat`.
    pub fn system_cpu(&self, clock_ticks: u64) -> Result<(u64, u32)> {
        let (path, text) = self.read("stat")?;
        let mut total_ticks = None;
        let mut online = 0u32;

        for line in text.lines() {
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("cpu") => {
                    // user nice system idle iowait irq softirq steal
                    let ticks: Result<Vec<u64>> = fields
                        .take(8)
                        .map(|f| {
                            f.parse::<u64>()
                                .map_err(|e| Error::parse(&path, format!("cpu field '{}': {}", f, e)))
                        })
                        .collect();
                    total_ticks = Some(ticks?.iter().sum::<u64>());
                }
                Some(name) if name.starts_with("cpu") => online += 1,
                _ => {}
            }
        }

        let ticks = total_ticks.ok_or_else(|| Error::parse(&path, "no aggregate cpu line"))?;
        let ns_per_tick = 1_000_000_000 / clock_ticks.max(1);
        Ok((ticks * ns_per_tick, online.max(1)))
    }

    /// `MemTotal` from `/proc/meminfo`, in bytes.
    pub fn mem_total(&self) -> Result<u64> {
        let (path, text) = self.read("meminfo")?;
        text.lines()
            .find_map(|line| line.strip_prefix("MemTotal:"))
            .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
            .map(|kib| kib * 1024)
            .ok_or_else(|| Error::parse(path, "MemTotal missing"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
