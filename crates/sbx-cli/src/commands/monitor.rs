use crate::GlobalArgs;
use anyhow::{Context, Result};
use clap::Args;
use sandbox_monitor::{
    BackgroundLoop, ContainerMonitor, OrphanReconciler, RuntimeSecurityMonitor, SandboxMetrics,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Arguments for the long-running monitor service
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Override the configured metrics port
    #[arg(long)]
    pub port: Option<u16>,

    /// Skip the periodic orphan reconciler
    #[arg(long)]
    pub no_reconcile: bool,

    /// Seconds between container refreshes (defaults to the security monitor poll interval)
    #[arg(long, value_name = "SECONDS")]
    pub refresh: Option<u64>,
}

impl MonitorArgs {
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        let runtime = global.container_runtime();
        let metrics = Arc::new(SandboxMetrics::new().context("Failed to create metrics registry")?);

        let containers = Arc::new(ContainerMonitor::from_config(runtime.clone(), metrics.clone(), &config));
        let security = Arc::new(
            RuntimeSecurityMonitor::new(runtime, config.security_monitor().clone()).with_metrics(metrics.clone()),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = if config.export_container_stats() {
            let port = self.port.unwrap_or_else(|| config.prometheus_port());
            let listener = TcpListener::bind(("0.0.0.0", port))
                .await
                .with_context(|| format!("Failed to bind metrics port {}", port))?;
            info!("Serving metrics on port {}", port);
            Some(tokio::spawn(metrics.clone().serve(listener, shutdown_rx)))
        } else {
            None
        };

        let reconciler = OrphanReconciler::new(containers.clone(), config.orphan_scan_interval());
        if !self.no_reconcile {
            reconciler.start();
        }

        let refresh_interval = self
            .refresh
            .map(Duration::from_secs)
            .unwrap_or(config.security_monitor().poll_interval);
        let refresher = BackgroundLoop::new("container refresh");
        {
            let containers = containers.clone();
            let security = security.clone();
            refresher.start(refresh_interval, move || {
                let containers = containers.clone();
                let security = security.clone();
                async move {
                    if let Err(e) = refresh(&containers, &security).await {
                        warn!("Container refresh failed: {:#}", e);
                    }
                }
            });
        }
        security.start();

        info!("Monitor running; press Ctrl-C to stop");
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
        info!("Shutting down monitor");

        security.stop().await;
        refresher.stop(STOP_TIMEOUT).await;
        reconciler.stop().await;
        let _ = shutdown_tx.send(true);
        if let Some(server) = server {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Metrics endpoint failed: {}", e),
                Err(e) => warn!("Metrics endpoint task panicked: {}", e),
            }
        }

        let events = security.events().len();
        if events > 0 {
            warn!("{} security events recorded during this session", events);
        }
        Ok(())
    }
}

/// Refresh container gauges and align the security monitor's registrations
/// with the managed containers that are currently running.
///
/// Executions started by other processes are adopted here so the monitor
/// watches them too. Returns `(adopted, released)`.
pub async fn refresh(containers: &ContainerMonitor, security: &RuntimeSecurityMonitor) -> Result<(usize, usize)> {
    let snapshots = containers.running_snapshots().await?;

    let metrics = containers.metrics();
    metrics.clear_containers();
    for snapshot in &snapshots {
        metrics.observe_container(snapshot);
    }
    metrics.set_running(snapshots.len());

    let mut adopted = 0;
    let running: HashSet<&str> = snapshots.iter().map(|s| s.id.as_str()).collect();
    for snapshot in &snapshots {
        if !security.is_registered(&snapshot.id) {
            debug!("Adopting container {} ({})", snapshot.name, snapshot.id);
            security.register(&snapshot.id, &snapshot.name);
            adopted += 1;
        }
    }

    let mut released = 0;
    for id in security.registered_ids() {
        if !running.contains(id.as_str()) {
            if let Some(kind) = security.deregister(&id) {
                info!("Container {} was terminated for {}", id, kind);
            }
            released += 1;
        }
    }
    Ok((adopted, released))
}
