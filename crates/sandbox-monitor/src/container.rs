//! Resource statistics and orphan management for sandbox containers.

use crate::metrics::SandboxMetrics;
use crate::Result;
use sandbox_config::SandboxConfig;
use sandbox_proto::{memory_percent, ContainerSnapshot, ContainerStatus};
use sandbox_runtime::error::Error as RuntimeError;
use sandbox_runtime::{managed_filter, ContainerRuntime, MANAGED_LABEL, MANAGED_LABEL_VALUE};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Resource a [`ResourceAlert`] is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    Memory,
    Cpu,
}

/// A running container above a resource threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAlert {
    pub container_id: String,
    pub container_name: String,
    pub metric: AlertMetric,
    pub value: f64,
    pub threshold: f64,
}

pub struct ContainerMonitor {
    runtime: Arc<dyn ContainerRuntime>,
    metrics: Arc<SandboxMetrics>,
    /// Orphan count that raises an alert; 0 disables alerting
    alert_threshold: u32,
    /// Cores a sandbox may use; snapshots report CPU as a share of it
    cpu_quota: Option<f64>,
}

impl ContainerMonitor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, metrics: Arc<SandboxMetrics>, alert_threshold: u32) -> Self {
        Self {
            runtime,
            metrics,
            alert_threshold,
            cpu_quota: None,
        }
    }

    pub fn with_cpu_quota(mut self, cores: f64) -> Self {
        self.cpu_quota = Some(cores);
        self
    }

    pub fn from_config(
        runtime: Arc<dyn ContainerRuntime>,
        metrics: Arc<SandboxMetrics>,
        config: &SandboxConfig,
    ) -> Self {
        Self::new(runtime, metrics, config.orphan_alert_threshold()).with_cpu_quota(config.cpu_limit())
    }

    pub fn metrics(&self) -> &Arc<SandboxMetrics> {
        &self.metrics
    }

    /// Snapshot of one container, `None` if it does not exist.
    ///
    /// Containers that are not running report zero usage. CPU is a
    /// percentage of the configured quota when one is set.
    pub async fn stats(&self, id: &str) -> Result<Option<ContainerSnapshot>> {
        let Some(info) = self.runtime.inspect(id).await? else {
            return Ok(None);
        };

        let mut snapshot = ContainerSnapshot {
            id: info.id,
            name: info.name,
            status: info.status,
            cpu_percent: 0.0,
            memory_usage: 0,
            memory_limit: 0,
            memory_percent: 0.0,
            pids: None,
            created_at: info.created_at,
            finished_at: info.finished_at,
        };
        if snapshot.status != ContainerStatus::Running {
            return Ok(Some(snapshot));
        }

        match self.runtime.stats(id).await {
            Ok(raw) => {
                snapshot.cpu_percent = raw.cpu_percent_of(self.cpu_quota);
                snapshot.memory_usage = raw.memory_usage();
                snapshot.memory_limit = raw.memory_limit();
                snapshot.memory_percent = memory_percent(raw.memory_usage(), raw.memory_limit());
                snapshot.pids = raw.pids();
                Ok(Some(snapshot))
            }
            Err(e) if e.is_not_found() => Ok(None),
            // exited between inspect and stats
            Err(RuntimeError::NotRunning(_)) => {
                snapshot.status = ContainerStatus::Exited;
                Ok(Some(snapshot))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of managed containers that exist but are not running, sorted.
    pub async fn scan_orphans(&self) -> Result<Vec<String>> {
        let filter = managed_filter().statuses(&ContainerStatus::ORPHAN_STATUSES);
        let mut ids: Vec<String> = self
            .runtime
            .list(&filter)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();

        self.metrics.set_orphaned(ids.len());
        if !ids.is_empty() {
            info!("Found {} orphaned sandbox containers", ids.len());
        }
        if self.alert_threshold > 0 && ids.len() >= self.alert_threshold as usize {
            error!(
                "ALERT: {} orphaned sandbox containers (threshold {}); cleanup is failing somewhere",
                ids.len(),
                self.alert_threshold
            );
        }
        Ok(ids)
    }

    /// Remove orphaned containers, scanning for them when `ids` is `None`.
    ///
    /// A container is only removed if it still carries the managed label.
    /// Containers that are already gone count as cleaned.
    pub async fn cleanup_orphans(&self, ids: Option<&[String]>) -> Result<usize> {
        let ids = match ids {
            Some(ids) => ids.to_vec(),
            None => self.scan_orphans().await?,
        };

        let mut cleaned = 0;
        for id in &ids {
            match self.runtime.inspect(id).await {
                Ok(None) => {
                    debug!("Orphan {} already removed", id);
                    cleaned += 1;
                    continue;
                }
                Ok(Some(info)) => {
                    if !info.has_label(MANAGED_LABEL, MANAGED_LABEL_VALUE) {
                        warn!("Refusing to remove container {}: not managed by the sandbox", id);
                        continue;
                    }
                    if info.status == ContainerStatus::Running {
                        warn!("Refusing to remove container {}: it is running", id);
                        continue;
                    }
                }
                Err(e) => {
                    warn!("Failed to inspect orphan {}: {}", id, e);
                    continue;
                }
            }

            match self.runtime.remove(id, true).await {
                Ok(()) => {
                    info!("Removed orphaned container {}", id);
                    cleaned += 1;
                }
                Err(e) if e.is_not_found() => cleaned += 1,
                Err(e) => warn!("Failed to remove orphan {}: {}", id, e),
            }
        }

        self.metrics.add_orphans_cleaned(cleaned);
        Ok(cleaned)
    }

    /// Scan for orphans and remove them.
    pub async fn reconcile(&self) -> Result<usize> {
        let orphans = self.scan_orphans().await?;
        if orphans.is_empty() {
            return Ok(0);
        }
        self.cleanup_orphans(Some(&orphans)).await
    }

    /// Snapshots of every running managed container.
    pub async fn running_snapshots(&self) -> Result<Vec<ContainerSnapshot>> {
        let filter = managed_filter().statuses(&[ContainerStatus::Running]);
        let running = self.runtime.list(&filter).await?;

        let mut snapshots = Vec::with_capacity(running.len());
        for container in running {
            match self.stats(&container.id).await {
                Ok(Some(snapshot)) if snapshot.status == ContainerStatus::Running => snapshots.push(snapshot),
                Ok(_) => {}
                Err(e) => warn!("Failed to read stats of {}: {}", container.id, e),
            }
        }
        Ok(snapshots)
    }

    /// Running containers whose memory or CPU percent exceeds a threshold.
    pub async fn resource_alerts(&self, memory_threshold: f64, cpu_threshold: f64) -> Result<Vec<ResourceAlert>> {
        let mut alerts = Vec::new();
        for snapshot in self.running_snapshots().await? {
            if snapshot.memory_percent > memory_threshold {
                alerts.push(ResourceAlert {
                    container_id: snapshot.id.clone(),
                    container_name: snapshot.name.clone(),
                    metric: AlertMetric::Memory,
                    value: snapshot.memory_percent,
                    threshold: memory_threshold,
                });
            }
            if snapshot.cpu_percent > cpu_threshold {
                alerts.push(ResourceAlert {
                    container_id: snapshot.id,
                    container_name: snapshot.name,
                    metric: AlertMetric::Cpu,
                    value: snapshot.cpu_percent,
                    threshold: cpu_threshold,
                });
            }
        }
        for alert in &alerts {
            warn!(
                "Container {} {:?} at {:.1}% (threshold {:.1}%)",
                alert.container_name, alert.metric, alert.value, alert.threshold
            );
        }
        Ok(alerts)
    }

    /// Refresh per-container gauges and the running count.
    pub async fn export_metrics(&self) -> Result<usize> {
        let snapshots = self.running_snapshots().await?;
        self.metrics.clear_containers();
        for snapshot in &snapshots {
            self.metrics.observe_container(snapshot);
        }
        self.metrics.set_running(snapshots.len());
        Ok(snapshots.len())
    }
}
