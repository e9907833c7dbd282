//! Cgroup counters for resource accounting of running containers.
//!
//! A container's usage is read from the cgroup of its init process. Both the
//! unified (v2) and legacy (v1) hierarchies are supported. CPU usage is
//! cumulative, so a percentage needs two samples; see [`cpu_percent`].

pub mod error;
pub mod proc;
pub mod reader;

pub type Result<T> = std::result::Result<T, error::Error>;

pub use proc::{CgroupLocation, ProcFs};
pub use reader::{CgroupReader, CgroupSample};

/// CPU usage between two samples, as a percentage of one core.
///
/// `(Δcontainer / Δsystem) × online_cpus × 100`. Returns 0 when the system
/// delta is not positive, e.g. when both samples are the same reading.
pub fn cpu_percent(previous: &CgroupSample, current: &CgroupSample) -> f64 {
    let cpu_delta = current.cpu_usage_ns as f64 - previous.cpu_usage_ns as f64;
    let system_delta = current.system_cpu_ns as f64 - previous.system_cpu_ns as f64;
    if system_delta <= 0.0 || cpu_delta < 0.0 {
        return 0.0;
    }
    let cpus = current.online_cpus.max(1) as f64;
    cpu_delta / system_delta * cpus * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu_usage_ns: u64, system_cpu_ns: u64) -> CgroupSample {
        CgroupSample {
            cpu_usage_ns,
            system_cpu_ns,
            online_cpus: 4,
            memory_usage: 0,
            memory_limit: 0,
            pids: None,
        }
    }

    #[test]
    fn test_cpu_percent_formula() {
        // One full core out of four over the interval.
        let previous = sample(1_000, 10_000);
        let current = sample(3_000, 18_000);
        assert!((cpu_percent(&previous, &current) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_percent_zero_denominator() {
        let same = sample(5_000, 10_000);
        assert_eq!(cpu_percent(&same, &same), 0.0);

        let backwards = sample(5_000, 9_000);
        assert_eq!(cpu_percent(&same, &backwards), 0.0);
    }

    #[test]
    fn test_cpu_percent_counter_reset() {
        let previous = sample(9_000, 10_000);
        let current = sample(1_000, 20_000);
        assert_eq!(cpu_percent(&previous, &current), 0.0);
    }
}
