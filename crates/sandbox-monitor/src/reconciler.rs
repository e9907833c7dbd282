//! Periodic orphan cleanup.

use crate::container::ContainerMonitor;
use crate::BackgroundLoop;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs [`ContainerMonitor::reconcile`] every `interval`.
pub struct OrphanReconciler {
    monitor: Arc<ContainerMonitor>,
    interval: Duration,
    background: BackgroundLoop,
}

impl OrphanReconciler {
    pub fn new(monitor: Arc<ContainerMonitor>, interval: Duration) -> Self {
        Self {
            monitor,
            interval,
            background: BackgroundLoop::new("orphan reconciler"),
        }
    }

    pub fn start(&self) -> bool {
        let monitor = self.monitor.clone();
        let started = self.background.start(self.interval, move || {
            let monitor = monitor.clone();
            async move {
                match monitor.reconcile().await {
                    Ok(0) => {}
                    Ok(cleaned) => info!("Reconciler removed {} orphaned containers", cleaned),
                    Err(e) => warn!("Orphan reconciliation failed: {}", e),
                }
            }
        });
        if started {
            info!("Orphan reconciler started (every {:?})", self.interval);
        }
        started
    }

    pub async fn stop(&self) -> bool {
        self.background.stop(STOP_TIMEOUT).await
    }

    pub fn is_running(&self) -> bool {
        self.background.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SandboxMetrics;
    use sandbox_proto::ContainerStatus;
    use sandbox_runtime::{MANAGED_LABEL, MANAGED_LABEL_VALUE};
    use sandbox_runtime_mock::FakeRuntime;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_reconciler_removes_orphans() {
        let runtime = Arc::new(FakeRuntime::new());
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_LABEL.to_string(), MANAGED_LABEL_VALUE.to_string());
        runtime.insert_container("o1", "sbx-o1", ContainerStatus::Exited, labels.clone());
        runtime.insert_container("o2", "sbx-o2", ContainerStatus::Dead, labels);

        let metrics = Arc::new(SandboxMetrics::new().unwrap());
        let monitor = Arc::new(ContainerMonitor::new(runtime.clone(), metrics.clone(), 0));
        let reconciler = OrphanReconciler::new(monitor, Duration::from_millis(20));

        assert!(reconciler.start());
        assert!(reconciler.is_running());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(reconciler.stop().await);

        assert!(runtime.container_ids().is_empty());
        assert_eq!(metrics.orphans_cleaned(), 2);
    }
}
