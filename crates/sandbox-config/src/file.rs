//! On-disk shape of the configuration document, before validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as written in YAML. Every field has a safe default.
///
/// Numeric fields are signed so out-of-range values reach validation and get
/// a field-specific error instead of a generic parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub enabled: bool,
    pub image: String,
    pub memory_limit: String,
    pub memory_swap_limit: Option<String>,
    pub cpu_limit: f64,
    pub timeout_seconds: i64,
    pub network_mode: String,
    pub read_only: bool,
    pub tmpfs: TmpfsFile,
    pub seccomp_profile: PathBuf,
    pub output_dir: PathBuf,
    pub cleanup_on_exit: bool,
    pub export_container_stats: bool,
    pub alert_on_orphaned_containers: i64,
    pub prometheus_port: i64,
    pub pids_limit: i64,
    pub interpreter: String,
    pub run_as_user: String,
    pub stop_grace_seconds: i64,
    pub orphan_scan_interval_seconds: i64,
    pub security_monitor: SecurityMonitorFile,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            enabled: true,
            image: "python:3.11-slim".to_string(),
            memory_limit: "2g".to_string(),
            memory_swap_limit: None,
            cpu_limit: 0.5,
            timeout_seconds: 600,
            network_mode: "none".to_string(),
            read_only: true,
            tmpfs: TmpfsFile::default(),
            seccomp_profile: PathBuf::from("config/seccomp_profile.json"),
            output_dir: PathBuf::from("sandbox_output"),
            cleanup_on_exit: true,
            export_container_stats: true,
            alert_on_orphaned_containers: 3,
            prometheus_port: 8000,
            pids_limit: 128,
            interpreter: "python3".to_string(),
            run_as_user: "1000:1000".to_string(),
            stop_grace_seconds: 1,
            orphan_scan_interval_seconds: 300,
            security_monitor: SecurityMonitorFile::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TmpfsFile {
    pub path: String,
    pub size: String,
    pub options: String,
}

impl Default for TmpfsFile {
    fn default() -> Self {
        Self {
            path: "/tmp".to_string(),
            size: "100m".to_string(),
            options: "rw,noexec,nosuid".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityMonitorFile {
    pub enabled: bool,
    pub poll_interval_seconds: i64,
    pub cpu_threshold: f64,
    pub cpu_consecutive: i64,
    pub memory_threshold: f64,
    pub memory_consecutive: i64,
    pub combined_threshold: f64,
    pub pids_threshold: Option<i64>,
    pub window_size: i64,
}

impl Default for SecurityMonitorFile {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 2,
            cpu_threshold: 95.0,
            cpu_consecutive: 3,
            memory_threshold: 95.0,
            memory_consecutive: 2,
            combined_threshold: 80.0,
            pids_threshold: None,
            window_size: 10,
        }
    }
}
