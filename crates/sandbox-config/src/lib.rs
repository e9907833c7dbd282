//! Sandbox configuration: resource limits, security profile location and
//! operational toggles.
//!
//! A [`SandboxConfig`] only exists in validated form. It is built once, from
//! defaults or a YAML file, and shared read-only afterwards.

pub mod env;
pub mod error;
pub mod file;
pub mod size;
pub mod types;

pub use error::ConfigError;
pub use file::{ConfigFile, SecurityMonitorFile, TmpfsFile};
pub use size::ByteSize;
pub use types::{NetworkMode, RunAsUser, SecurityMonitorSettings, TmpfsSettings};

pub type Result<T> = std::result::Result<T, ConfigError>;

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MAX_TIMEOUT_SECS: i64 = 3600;
pub const MAX_CPU_LIMIT: f64 = 64.0;
pub const MAX_PIDS_LIMIT: i64 = 4096;
pub const MIN_METRICS_PORT: i64 = 1024;
pub const MAX_METRICS_PORT: i64 = 65535;

/// Immutable, validated sandbox configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    enabled: bool,
    image: String,
    memory_limit: ByteSize,
    memory_swap_limit: ByteSize,
    cpu_limit: f64,
    timeout: Duration,
    network_mode: NetworkMode,
    read_only: bool,
    tmpfs: TmpfsSettings,
    seccomp_profile: PathBuf,
    output_dir: PathBuf,
    cleanup_on_exit: bool,
    export_container_stats: bool,
    orphan_alert_threshold: u32,
    prometheus_port: u16,
    pids_limit: u32,
    interpreter: String,
    run_as: RunAsUser,
    stop_grace: Duration,
    orphan_scan_interval: Duration,
    security_monitor: SecurityMonitorSettings,
}

impl SandboxConfig {
    /// Load configuration from `path`, falling back to built-in defaults when
    /// no path is given or the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                info!("Loading sandbox config from {}", path.display());
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml_str(&content)
            }
            Some(path) => {
                info!("Config file {} not found, using defaults", path.display());
                Self::try_from(ConfigFile::default())
            }
            None => Self::try_from(ConfigFile::default()),
        }
    }

    /// Parse a YAML document, substituting `${VAR}` references from the environment.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_yaml_str_with(content, &|name| std::env::var(name).ok())
    }

    /// Parse a YAML document, resolving `${VAR}` references with `lookup`.
    pub fn from_yaml_str_with<F>(content: &str, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        // An empty document means "all defaults".
        if document.is_null() {
            return Self::try_from(ConfigFile::default());
        }
        let document = env::substitute_with(document, lookup)?;
        let file: ConfigFile = serde_yaml::from_value(document)?;
        Self::try_from(file)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn memory_limit(&self) -> ByteSize {
        self.memory_limit
    }

    pub fn memory_swap_limit(&self) -> ByteSize {
        self.memory_swap_limit
    }

    pub fn cpu_limit(&self) -> f64 {
        self.cpu_limit
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn network_mode(&self) -> NetworkMode {
        self.network_mode
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn tmpfs(&self) -> &TmpfsSettings {
        &self.tmpfs
    }

    pub fn seccomp_profile(&self) -> &Path {
        &self.seccomp_profile
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cleanup_on_exit(&self) -> bool {
        self.cleanup_on_exit
    }

    pub fn export_container_stats(&self) -> bool {
        self.export_container_stats
    }

    /// Orphan count at which an alert is raised; zero disables alerting.
    pub fn orphan_alert_threshold(&self) -> u32 {
        self.orphan_alert_threshold
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn pids_limit(&self) -> u32 {
        self.pids_limit
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn run_as(&self) -> RunAsUser {
        self.run_as
    }

    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    pub fn orphan_scan_interval(&self) -> Duration {
        self.orphan_scan_interval
    }

    pub fn security_monitor(&self) -> &SecurityMonitorSettings {
        &self.security_monitor
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        // Covered by test_defaults_are_safe.
        Self::try_from(ConfigFile::default()).expect("built-in defaults are valid")
    }
}

impl TryFrom<ConfigFile> for SandboxConfig {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let image = file.image.trim().to_string();
        if image.is_empty() {
            return Err(ConfigError::invalid("image", "must not be empty"));
        }
        if !image.contains("@sha256:") {
            warn!("Sandbox image {} is not pinned by digest", image);
        }

        let memory_limit = ByteSize::parse("memory_limit", &file.memory_limit)?;
        let memory_swap_limit = match &file.memory_swap_limit {
            Some(raw) => ByteSize::parse("memory_swap_limit", raw)?,
            None => memory_limit,
        };
        if memory_swap_limit < memory_limit {
            return Err(ConfigError::invalid(
                "memory_swap_limit",
                format!("{} is below memory_limit {}", memory_swap_limit, memory_limit),
            ));
        }

        if !file.cpu_limit.is_finite() || file.cpu_limit <= 0.0 || file.cpu_limit > MAX_CPU_LIMIT {
            return Err(ConfigError::invalid(
                "cpu_limit",
                format!("{} must be a positive number <= {}", file.cpu_limit, MAX_CPU_LIMIT),
            ));
        }

        let timeout_secs = in_range("timeout_seconds", file.timeout_seconds, 1, MAX_TIMEOUT_SECS)?;
        let network_mode: NetworkMode = file.network_mode.parse()?;

        if !file.tmpfs.path.starts_with('/') {
            return Err(ConfigError::invalid("tmpfs.path", "must be an absolute path"));
        }
        if file.tmpfs.options.contains(':') {
            return Err(ConfigError::invalid("tmpfs.options", "must not contain ':'"));
        }
        let tmpfs = TmpfsSettings {
            path: file.tmpfs.path.clone(),
            size: ByteSize::parse("tmpfs.size", &file.tmpfs.size)?,
            options: file.tmpfs.options.trim().to_string(),
        };

        let orphan_alert_threshold = in_range(
            "alert_on_orphaned_containers",
            file.alert_on_orphaned_containers,
            0,
            i64::from(u32::MAX),
        )?;
        let prometheus_port = in_range(
            "prometheus_port",
            file.prometheus_port,
            MIN_METRICS_PORT,
            MAX_METRICS_PORT,
        )?;
        let pids_limit = in_range("pids_limit", file.pids_limit, 1, MAX_PIDS_LIMIT)?;

        let interpreter = file.interpreter.trim().to_string();
        if interpreter.is_empty() || interpreter.contains(char::is_whitespace) {
            return Err(ConfigError::invalid("interpreter", "must be a single command name"));
        }

        let run_as = RunAsUser::parse(&file.run_as_user)?;
        let stop_grace = in_range("stop_grace_seconds", file.stop_grace_seconds, 0, 30)?;
        let orphan_scan_interval = in_range(
            "orphan_scan_interval_seconds",
            file.orphan_scan_interval_seconds,
            1,
            86_400,
        )?;

        let monitor = &file.security_monitor;
        let security_monitor = SecurityMonitorSettings {
            enabled: monitor.enabled,
            poll_interval: Duration::from_secs(in_range(
                "security_monitor.poll_interval_seconds",
                monitor.poll_interval_seconds,
                1,
                300,
            )?),
            cpu_quota: Some(file.cpu_limit),
            cpu_threshold: monitor.cpu_threshold,
            cpu_consecutive: in_range(
                "security_monitor.cpu_consecutive",
                monitor.cpu_consecutive,
                1,
                1000,
            )? as usize,
            memory_threshold: monitor.memory_threshold,
            memory_consecutive: in_range(
                "security_monitor.memory_consecutive",
                monitor.memory_consecutive,
                1,
                1000,
            )? as usize,
            combined_threshold: monitor.combined_threshold,
            pids_threshold: match monitor.pids_threshold {
                Some(raw) => Some(in_range("security_monitor.pids_threshold", raw, 1, i64::MAX)?),
                None => None,
            },
            window_size: in_range("security_monitor.window_size", monitor.window_size, 1, 1000)?
                as usize,
        };
        security_monitor.validate()?;

        let config = Self {
            enabled: file.enabled,
            image,
            memory_limit,
            memory_swap_limit,
            cpu_limit: file.cpu_limit,
            timeout: Duration::from_secs(timeout_secs),
            network_mode,
            read_only: file.read_only,
            tmpfs,
            seccomp_profile: file.seccomp_profile,
            output_dir: file.output_dir,
            cleanup_on_exit: file.cleanup_on_exit,
            export_container_stats: file.export_container_stats,
            orphan_alert_threshold: orphan_alert_threshold as u32,
            prometheus_port: prometheus_port as u16,
            pids_limit: pids_limit as u32,
            interpreter,
            run_as,
            stop_grace: Duration::from_secs(stop_grace),
            orphan_scan_interval: Duration::from_secs(orphan_scan_interval),
            security_monitor,
        };
        debug!("Validated sandbox config: {:?}", config);
        Ok(config)
    }
}

fn in_range(field: &str, value: i64, min: i64, max: i64) -> Result<u64> {
    if value < min || value > max {
        return Err(ConfigError::invalid(
            field,
            format!("{} must lie in [{}, {}]", value, min, max),
        ));
    }
    Ok(value as u64)
}
