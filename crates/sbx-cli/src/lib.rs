//! Strategy sandbox CLI library

pub mod commands;

// Re-export CLI types for testing
pub use clap::{Parser, Subcommand};

use anyhow::{Context, Result};
use clap::Args;
use sandbox_config::SandboxConfig;
use sandbox_runtime::{ContainerRuntime, DockerCli};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sbx")]
#[command(about = "Run untrusted strategy code in isolated containers")]
#[command(version, author, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Sandbox configuration file (YAML)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Container engine binary (docker or podman)
    #[arg(long, global = true, default_value = "docker")]
    pub runtime: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalArgs {
    pub fn load_config(&self) -> Result<Arc<SandboxConfig>> {
        let config = SandboxConfig::load(self.config.as_deref()).context("Failed to load sandbox configuration")?;
        Ok(Arc::new(config))
    }

    pub fn container_runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::new(DockerCli::with_binary(self.runtime.clone()))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a Python file in a sandbox container
    Run(commands::run::RunArgs),

    /// Statically validate a Python file without running it
    Validate(commands::validate::ValidateArgs),

    /// Find or remove containers left behind by crashed executions
    Orphans {
        #[command(subcommand)]
        subcommand: commands::orphans::OrphansCommands,
    },

    /// Run the security monitor, orphan reconciler and metrics endpoint
    Monitor(commands::monitor::MonitorArgs),

    /// Write the default seccomp profile
    Profile(commands::profile::ProfileArgs),
}
