use crate::GlobalArgs;
use anyhow::{Context, Result};
use clap::Subcommand;
use sandbox_monitor::{ContainerMonitor, SandboxMetrics};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum OrphansCommands {
    /// List orphaned sandbox containers
    Scan,
    /// Remove orphaned sandbox containers (all of them when no ids are given)
    Cleanup {
        /// Container ids to remove
        ids: Vec<String>,
    },
}

impl OrphansCommands {
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        let metrics = Arc::new(SandboxMetrics::new().context("Failed to create metrics registry")?);
        let monitor = ContainerMonitor::from_config(global.container_runtime(), metrics, &config);

        match self {
            Self::Scan => {
                let orphans = monitor.scan_orphans().await.context("Failed to scan for orphans")?;
                for id in &orphans {
                    println!("{}", id);
                }
                eprintln!("{} orphaned containers", orphans.len());
            }
            Self::Cleanup { ids } => {
                let ids = (!ids.is_empty()).then_some(ids);
                let cleaned = monitor
                    .cleanup_orphans(ids.as_deref())
                    .await
                    .context("Failed to clean up orphans")?;
                println!("Removed {} orphaned containers", cleaned);
            }
        }
        Ok(())
    }
}
