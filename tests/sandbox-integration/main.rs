//! End-to-end tests against a real container engine.
//!
//! Every test returns early when `docker info` fails or the configured image
//! is not present locally, so the suite stays green on machines without Docker.

use sandbox_config::SandboxConfig;
use sandbox_core::{ContainerExecutor, ExecuteOptions};
use sandbox_monitor::{ContainerMonitor, SandboxMetrics};
use sandbox_proto::{ExecutionErrorKind, SIGNAL_END_MARKER, SIGNAL_START_MARKER};
use sandbox_runtime::{ContainerRuntime, DockerCli, MANAGED_LABEL, MANAGED_LABEL_VALUE};
use serde_json::json;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn docker_ready(image: &str) -> bool {
    let daemon = Command::new("docker")
        .arg("info")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !daemon {
        eprintln!("Skipping: docker daemon not available");
        return false;
    }
    let pulled = Command::new("docker")
        .args(["image", "inspect", image])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !pulled {
        eprintln!("Skipping: image {} not present locally", image);
    }
    pulled
}

fn setup() -> Option<(ContainerExecutor, Arc<dyn ContainerRuntime>)> {
    let config = SandboxConfig::default();
    if !docker_ready(config.image()) {
        return None;
    }
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new());
    let executor = ContainerExecutor::new(Arc::new(config), runtime.clone());
    Some((executor, runtime))
}

fn marked(payload: &str) -> String {
    format!("print('{}' + '{}' + '{}')", SIGNAL_START_MARKER, payload, SIGNAL_END_MARKER)
}

async fn assert_gone(runtime: &Arc<dyn ContainerRuntime>, id: &str) {
    let err = runtime.inspect(id).await.unwrap_err();
    assert!(err.is_not_found(), "container {} still present: {}", id, err);
}

#[tokio::test]
async fn test_forbidden_import_never_reaches_docker() {
    let Some((executor, _runtime)) = setup() else { return };

    let result = executor.execute("import os\nos.system('ls')", ExecuteOptions::default()).await;

    assert!(!result.success);
    assert!(result.is_kind(ExecutionErrorKind::Validation));
    assert!(result.error.as_deref().unwrap_or_default().contains("os"));
    assert!(result.container_id.is_none());
}

#[tokio::test]
async fn test_structured_output_round_trip() {
    let Some((executor, runtime)) = setup() else { return };
    let source = format!("signal = {{'a': 1}}\n{}\n", marked(r#"{"a": 1}"#));

    let result = executor.execute(&source, ExecuteOptions::default().without_validation()).await;

    assert!(result.success, "execution failed: {:?}", result.error);
    assert_eq!(result.structured_output, Some(json!({"a": 1})));
    assert!(result.cleanup_succeeded);
    assert_gone(&runtime, result.container_id.as_deref().unwrap()).await;
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let Some((executor, runtime)) = setup() else { return };

    let started = Instant::now();
    let result = executor
        .execute("while True: pass", ExecuteOptions::default().with_timeout(Duration::from_secs(2)))
        .await;
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert!(result.is_kind(ExecutionErrorKind::Timeout));
    let message = result.error.as_deref().unwrap_or_default();
    assert!(message.contains('2') && message.to_lowercase().contains("timeout"), "{}", message);
    assert!(elapsed >= Duration::from_secs(2), "returned early after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(7), "took {:?}", elapsed);
    assert!(result.cleanup_succeeded);
    assert_gone(&runtime, result.container_id.as_deref().unwrap()).await;
}

#[tokio::test]
async fn test_runtime_failure_is_cleaned_up() {
    let Some((executor, runtime)) = setup() else { return };

    let result = executor
        .execute("raise ValueError('boom')", ExecuteOptions::default())
        .await;

    assert!(result.is_kind(ExecutionErrorKind::Runtime));
    assert_eq!(result.exit_code, Some(1));
    assert!(result.error.as_deref().unwrap_or_default().contains("boom"));
    assert!(result.cleanup_succeeded);
    assert_gone(&runtime, result.container_id.as_deref().unwrap()).await;
}

#[tokio::test]
async fn test_concurrent_executions_are_isolated() {
    let Some((executor, _runtime)) = setup() else { return };
    let first = format!("signal = 1\n{}\n", marked("1"));
    let second = format!("signal = 2\n{}\n", marked("2"));

    let (a, b) = tokio::join!(
        executor.execute(&first, ExecuteOptions::default()),
        executor.execute(&second, ExecuteOptions::default()),
    );

    assert!(a.success && b.success, "{:?} / {:?}", a.error, b.error);
    assert_ne!(a.container_id, b.container_id);
    assert_eq!(a.structured_output, Some(json!(1)));
    assert_eq!(b.structured_output, Some(json!(2)));
}

#[tokio::test]
async fn test_leftover_container_is_reconciled() {
    let Some((_executor, runtime)) = setup() else { return };
    let image = SandboxConfig::default().image().to_string();

    let output = Command::new("docker")
        .args(["run", "-d", "--label"])
        .arg(format!("{}={}", MANAGED_LABEL, MANAGED_LABEL_VALUE))
        .args([image.as_str(), "true"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Command::new("docker").args(["wait", &id]).output().unwrap();

    let metrics = Arc::new(SandboxMetrics::new().unwrap());
    let monitor = ContainerMonitor::new(runtime.clone(), metrics.clone(), 0);

    let orphans = monitor.scan_orphans().await.unwrap();
    assert!(orphans.contains(&id), "{} not in {:?}", id, orphans);

    let before = metrics.orphans_cleaned();
    let cleaned = monitor.cleanup_orphans(Some(&[id.clone()])).await.unwrap();
    assert_eq!(cleaned, 1);
    assert_eq!(metrics.orphans_cleaned(), before + 1);
    assert_gone(&runtime, &id).await;
}
