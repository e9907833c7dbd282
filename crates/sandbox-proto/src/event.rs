//! Audit records emitted when the runtime monitor enforces a policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of runtime policy breach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    CpuSpike,
    MemorySpike,
    ForkBombSuspected,
    CombinedAnomaly,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CpuSpike => "cpu_spike",
            Self::MemorySpike => "memory_spike",
            Self::ForkBombSuspected => "fork_bomb_suspected",
            Self::CombinedAnomaly => "combined_anomaly",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action taken in response to a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    Terminate,
}

/// Measured values behind a violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationDetails {
    /// Observed value of the primary metric (CPU%, memory% or pid count).
    pub observed: f64,
    pub threshold: f64,
    /// Consecutive flagged polls that led to the decision; 1 for instantaneous checks.
    pub consecutive: u32,
    /// Memory% for combined anomalies, where `observed` holds CPU%.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_observed: Option<f64>,
}

/// One enforcement record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub container_id: String,
    pub container_name: String,
    pub kind: ViolationKind,
    pub details: ViolationDetails,
    pub action: EnforcementAction,
    pub action_succeeded: bool,
}

impl SecurityEvent {
    pub fn terminate(
        container_id: impl Into<String>,
        container_name: impl Into<String>,
        kind: ViolationKind,
        details: ViolationDetails,
        action_succeeded: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            container_id: container_id.into(),
            container_name: container_name.into(),
            kind,
            details,
            action: EnforcementAction::Terminate,
            action_succeeded,
        }
    }
}
