use crate::GlobalArgs;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use sandbox_core::{ContainerExecutor, ExecuteOptions};
use sandbox_fs::write_json_artifact;
use sandbox_monitor::{RuntimeSecurityMonitor, SandboxMetrics};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Arguments for executing a file in the sandbox
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Python file to execute
    pub file: PathBuf,

    /// Wall-clock limit in seconds (defaults to the configured timeout)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Skip static validation
    #[arg(long)]
    pub no_validate: bool,
}

impl RunArgs {
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        let source = std::fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let config = global.load_config()?;
        let runtime = global.container_runtime();

        let metrics = Arc::new(SandboxMetrics::new().context("Failed to create metrics registry")?);
        let monitor = Arc::new(
            RuntimeSecurityMonitor::new(runtime.clone(), config.security_monitor().clone()).with_metrics(metrics),
        );
        monitor.start();

        let executor = ContainerExecutor::new(config.clone(), runtime).with_security_monitor(monitor.clone());
        let mut options = ExecuteOptions::default();
        if let Some(secs) = self.timeout {
            options = options.with_timeout(Duration::from_secs(secs));
        }
        if self.no_validate {
            options = options.without_validation();
        }

        let result = executor.execute(&source, options).await;
        if !monitor.stop().await {
            warn!("Security monitor did not shut down cleanly");
        }

        let now = Utc::now();
        let path = write_json_artifact(config.output_dir(), &artifact_stem("execution", now), &result)
            .context("Failed to write execution result")?;
        info!("Execution result written to {}", path.display());

        let events = monitor.events().events();
        if !events.is_empty() {
            let path = write_json_artifact(config.output_dir(), &artifact_stem("security-events", now), &events)
                .context("Failed to write security events")?;
            warn!("{} security events written to {}", events.len(), path.display());
        }

        println!("{}", serde_json::to_string_pretty(&result)?);
        if !result.success {
            let kind = result.error_kind.map(|k| k.to_string()).unwrap_or_default();
            bail!("Execution failed ({})", kind);
        }
        Ok(())
    }
}

/// Artifact name without extension; `write_json_artifact` appends `.json`.
fn artifact_stem(kind: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", kind, at.format("%Y%m%dT%H%M%S%.3fZ"))
}
