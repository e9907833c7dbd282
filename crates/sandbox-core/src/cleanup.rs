//! Escalating container removal.

use sandbox_runtime::ContainerRuntime;
use std::fmt;
use tracing::{debug, warn};

/// One way of removing a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStrategy {
    Remove,
    ForceRemove,
    KillThenForceRemove,
}

impl RemovalStrategy {
    /// Apply this strategy. A container that is already gone counts as removed.
    pub async fn apply(&self, runtime: &dyn ContainerRuntime, id: &str) -> sandbox_runtime::Result<()> {
        let result = match self {
            Self::Remove => runtime.remove(id, false).await,
            Self::ForceRemove => runtime.remove(id, true).await,
            Self::KillThenForceRemove => {
                if let Err(e) = runtime.kill(id).await {
                    debug!("Kill before removal of {} failed: {}", id, e);
                }
                runtime.remove(id, true).await
            }
        };
        match result {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}

impl fmt::Display for RemovalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remove => "remove",
            Self::ForceRemove => "force remove",
            Self::KillThenForceRemove => "kill then force remove",
        })
    }
}

/// Ordered removal strategies; the first that succeeds wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPolicy {
    strategies: Vec<RemovalStrategy>,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::new(vec![
            RemovalStrategy::Remove,
            RemovalStrategy::ForceRemove,
            RemovalStrategy::KillThenForceRemove,
        ])
    }
}

impl CleanupPolicy {
    pub fn new(strategies: Vec<RemovalStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[RemovalStrategy] {
        &self.strategies
    }

    /// Try each strategy in order. Returns the one that removed the
    /// container, or `None` if every strategy failed.
    pub async fn remove(&self, runtime: &dyn ContainerRuntime, id: &str) -> Option<RemovalStrategy> {
        for strategy in &self.strategies {
            match strategy.apply(runtime, id).await {
                Ok(()) => {
                    debug!("Removed container {} ({})", id, strategy);
                    return Some(*strategy);
                }
                Err(e) => warn!("Container {} removal ({}) failed: {}", id, strategy, e),
            }
        }
        None
    }
}
