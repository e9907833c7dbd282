//! Plain data exchanged with a container runtime.

use chrono::{DateTime, Utc};
use sandbox_cgroups::CgroupSample;
use sandbox_config::{NetworkMode, RunAsUser};
use sandbox_fs::{BindMount, TmpfsMount};
use sandbox_proto::ContainerStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything needed to create one sandbox container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<BindMount>,
    pub tmpfs: Vec<TmpfsMount>,
    pub read_only_root: bool,
    pub network: NetworkMode,
    pub memory_bytes: u64,
    pub memory_swap_bytes: u64,
    pub cpus: f64,
    pub pids_limit: u64,
    pub user: RunAsUser,
    /// Syscall-filtering profile; the runtime default applies when `None`.
    pub seccomp_profile: Option<PathBuf>,
    pub working_dir: Option<String>,
}

/// Result of inspecting a container
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
    pub exit_code: Option<i64>,
    /// Host pid of the container's init process while it runs
    pub pid: Option<u32>,
    pub oom_killed: bool,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ContainerInfo {
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).map(String::as_str) == Some(value)
    }
}

/// One row of a container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
}

/// Label and status filter for a single listing call.
///
/// Every label must match; any of the statuses may match. An empty status
/// list matches every status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub labels: Vec<(String, String)>,
    pub statuses: Vec<ContainerStatus>,
}

impl ListFilter {
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn statuses(mut self, statuses: &[ContainerStatus]) -> Self {
        self.statuses.extend_from_slice(statuses);
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>, status: ContainerStatus) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
            && (self.statuses.is_empty() || self.statuses.contains(&status))
    }
}

/// Two cumulative counter samples of one container, a short interval apart
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawStats {
    pub previous: CgroupSample,
    pub current: CgroupSample,
}

impl RawStats {
    pub fn cpu_percent(&self) -> f64 {
        sandbox_cgroups::cpu_percent(&self.previous, &self.current)
    }

    /// CPU usage as a percentage of `quota` cores, capped at 100. Without a
    /// quota this is [`RawStats::cpu_percent`].
    pub fn cpu_percent_of(&self, quota: Option<f64>) -> f64 {
        let percent = self.cpu_percent();
        match quota {
            Some(cores) if cores.is_finite() && cores > 0.0 => (percent / cores).min(100.0),
            _ => percent,
        }
    }

    pub fn memory_usage(&self) -> u64 {
        self.current.memory_usage
    }

    pub fn memory_limit(&self) -> u64 {
        self.current.memory_limit
    }

    pub fn pids(&self) -> Option<u64> {
        self.current.pids
    }

    /// Stats of an idle container using `memory_usage` of `memory_limit`.
    pub fn steady(memory_usage: u64, memory_limit: u64) -> Self {
        let sample = CgroupSample {
            cpu_usage_ns: 0,
            system_cpu_ns: 0,
            online_cpus: 1,
            memory_usage,
            memory_limit,
            pids: None,
        };
        Self {
            previous: sample,
            current: sample,
        }
    }

    /// Stats reporting `cpu_percent` of one core and the given memory use.
    pub fn with_usage(cpu_percent: f64, memory_usage: u64, memory_limit: u64, pids: Option<u64>) -> Self {
        let system = 1_000_000_000u64;
        let previous = CgroupSample {
            cpu_usage_ns: 0,
            system_cpu_ns: 0,
            online_cpus: 1,
            memory_usage,
            memory_limit,
            pids,
        };
        let current = CgroupSample {
            cpu_usage_ns: (cpu_percent / 100.0 * system as f64).round() as u64,
            system_cpu_ns: system,
            ..previous
        };
        Self { previous, current }
    }
}
