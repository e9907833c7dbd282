//! Validated building blocks of [`crate::SandboxConfig`].

use crate::error::ConfigError;
use crate::size::ByteSize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Network isolation mode for the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkMode {
    /// No network access
    #[default]
    None,
    /// Isolated bridge network
    Bridge,
    /// Host network
    Host,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bridge => "bridge",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "bridge" => Ok(Self::Bridge),
            "host" => Ok(Self::Host),
            other => Err(ConfigError::invalid(
                "network_mode",
                format!("'{}' is not one of none, bridge, host", other),
            )),
        }
    }
}

/// Writable in-memory scratch filesystem inside the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmpfsSettings {
    pub path: String,
    pub size: ByteSize,
    pub options: String,
}

/// Numeric, non-root identity the sandboxed process runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunAsUser {
    pub uid: u32,
    pub gid: u32,
}

impl RunAsUser {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || {
            ConfigError::invalid(
                "run_as_user",
                format!("'{}' must be a numeric uid[:gid] with a non-zero uid", raw),
            )
        };
        let (uid, gid) = match raw.split_once(':') {
            Some((uid, gid)) => (uid, gid),
            None => (raw, raw),
        };
        let uid: u32 = uid.trim().parse().map_err(|_| invalid())?;
        let gid: u32 = gid.trim().parse().map_err(|_| invalid())?;
        if uid == 0 {
            return Err(invalid());
        }
        Ok(Self { uid, gid })
    }
}

impl Default for RunAsUser {
    fn default() -> Self {
        Self { uid: 1000, gid: 1000 }
    }
}

impl fmt::Display for RunAsUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Thresholds and cadence of the runtime security monitor
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityMonitorSettings {
    pub enabled: bool,
    pub poll_interval: Duration,
    /// CPU cores a container may use. `cpu_threshold` is a percentage of
    /// this; `None` measures against one core.
    pub cpu_quota: Option<f64>,
    pub cpu_threshold: f64,
    pub cpu_consecutive: usize,
    pub memory_threshold: f64,
    pub memory_consecutive: usize,
    pub combined_threshold: f64,
    /// Pid count at which a fork bomb is suspected; `None` leaves the pids
    /// ceiling applied at creation time as the only guard.
    pub pids_threshold: Option<u64>,
    pub window_size: usize,
}

impl Default for SecurityMonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(2),
            cpu_quota: None,
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

impl SecurityMonitorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() || self.poll_interval > Duration::from_secs(300) {
            return Err(ConfigError::invalid(
                "security_monitor.poll_interval_seconds",
                "must lie in [1, 300]",
            ));
        }
        for (field, value) in [
            ("security_monitor.cpu_threshold", self.cpu_threshold),
            ("security_monitor.memory_threshold", self.memory_threshold),
            ("security_monitor.combined_threshold", self.combined_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 100.0 {
                return Err(ConfigError::invalid(field, format!("{} must lie in (0, 100]", value)));
            }
        }
        for (field, value) in [
            ("security_monitor.cpu_consecutive", self.cpu_consecutive),
            ("security_monitor.memory_consecutive", self.memory_consecutive),
        ] {
            if value == 0 || value > self.window_size {
                return Err(ConfigError::invalid(
                    field,
                    format!("{} must lie in [1, window_size={}]", value, self.window_size),
                ));
            }
        }
        if self.pids_threshold == Some(0) {
            return Err(ConfigError::invalid(
                "security_monitor.pids_threshold",
                "must be positive when set",
            ));
        }
        Ok(())
    }
}
