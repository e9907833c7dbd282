use anyhow::{bail, Context, Result};
use clap::Args;
use sandbox_validator::StaticCodeValidator;
use std::path::PathBuf;

/// Arguments for static validation
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Python file to check
    pub file: PathBuf,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    pub async fn run(self) -> Result<()> {
        let source = std::fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let report = StaticCodeValidator::new().validate(&source);

        if self.json {
            let value = serde_json::json!({
                "file": self.file,
                "is_valid": report.is_valid(),
                "violations": report.violations(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else if report.is_valid() {
            println!("{}: OK", self.file.display());
        } else {
            for violation in report.violations() {
                println!("{}: {}", self.file.display(), violation);
            }
        }

        if !report.is_valid() {
            bail!("{} violations found", report.violations().len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, source: &str) -> PathBuf {
        let path = dir.path().join("strategy.py");
        std::fs::write(&path, source).unwrap();
        path
    }

    #[tokio::test]
    async fn test_clean_file_passes() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "import math\nprint(math.sqrt(4))\n");
        assert!(ValidateArgs { file, json: false }.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_forbidden_import_fails() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "import subprocess\nsubprocess.run(['ls'])\n");
        let err = ValidateArgs { file, json: true }.run().await.unwrap_err();
        assert!(err.to_string().contains("violations found"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("absent.py");
        assert!(ValidateArgs { file, json: false }.run().await.is_err());
    }
}
