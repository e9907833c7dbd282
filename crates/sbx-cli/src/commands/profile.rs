use anyhow::{Context, Result};
use clap::Args;
use sandbox_seccomp::ProfileBuilder;
use std::path::PathBuf;
use tracing::info;

/// Arguments for writing the default seccomp profile
#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Destination file
    pub path: PathBuf,

    /// Leave ptrace and related syscalls allowed
    #[arg(long)]
    pub allow_debugging: bool,
}

impl ProfileArgs {
    pub async fn run(self) -> Result<()> {
        let mut builder = ProfileBuilder::new();
        builder
            .block_mount_operations()
            .block_system_administration()
            .block_namespace_operations()
            .block_keyring_operations()
            .block_kernel_attack_surface()
            .set_debug_mode(self.allow_debugging);
        let profile = builder.build();

        profile
            .write(&self.path)
            .with_context(|| format!("Failed to write profile to {}", self.path.display()))?;
        info!("Wrote seccomp profile with {} rules to {}", profile.syscalls.len(), self.path.display());
        Ok(())
    }
}
