//! Execution of one untrusted submission in one ephemeral container.
//!
//! Every call runs validate, prepare, create, run, then a single teardown
//! pass that happens no matter which step failed. Failures are encoded in
//! the returned [`ExecutionResult`]; `execute` itself never errors.

use crate::cleanup::CleanupPolicy;
use sandbox_config::SandboxConfig;
use sandbox_fs::{ScratchWorkspace, TmpfsMount};
use sandbox_monitor::RuntimeSecurityMonitor;
use sandbox_proto::{extract_payload, ContainerStatus, ExecutionErrorKind, ExecutionResult};
use sandbox_runtime::error::Error as RuntimeError;
use sandbox_runtime::{ContainerRuntime, ContainerSpec, EXECUTION_LABEL, MANAGED_LABEL, MANAGED_LABEL_VALUE};
use sandbox_seccomp::SecurityProfile;
use sandbox_validator::StaticCodeValidator;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Extra time a graceful stop may take beyond its grace period.
const STOP_SLACK: Duration = Duration::from_secs(5);

/// Characters of output quoted in a runtime error message.
const LOG_EXCERPT_CHARS: usize = 2000;

/// Per-call options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Wall-clock bound; the configured timeout when `None`
    pub timeout: Option<Duration>,
    pub validate: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            validate: true,
        }
    }
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }
}

/// Removes the container in the background if an execution is dropped
/// before its teardown ran.
struct TeardownGuard {
    runtime: Arc<dyn ContainerRuntime>,
    security: Option<Arc<RuntimeSecurityMonitor>>,
    container_id: Option<String>,
}

impl TeardownGuard {
    fn disarm(&mut self) {
        self.container_id = None;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(id) = self.container_id.take() else {
            return;
        };
        if let Some(security) = &self.security {
            security.deregister(&id);
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Execution owning container {} was cancelled; removing it", id);
                let runtime = self.runtime.clone();
                handle.spawn(async move {
                    match runtime.remove(&id, true).await {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => error!("Failed to remove container {} of a cancelled execution: {}", id, e),
                    }
                });
            }
            Err(_) => error!("Container {} leaked: no async runtime left to remove it", id),
        }
    }
}

/// Runs submissions in isolated containers.
///
/// Holds no per-call state, so one executor can serve any number of
/// concurrent `execute` calls.
pub struct ContainerExecutor {
    config: Arc<SandboxConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    validator: StaticCodeValidator,
    security: Option<Arc<RuntimeSecurityMonitor>>,
    cleanup: CleanupPolicy,
    scratch_root: Option<PathBuf>,
}

impl ContainerExecutor {
    pub fn new(config: Arc<SandboxConfig>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime,
            validator: StaticCodeValidator::new(),
            security: None,
            cleanup: CleanupPolicy::default(),
            scratch_root: None,
        }
    }

    /// Register every container with `monitor` while it runs.
    pub fn with_security_monitor(mut self, monitor: Arc<RuntimeSecurityMonitor>) -> Self {
        self.security = Some(monitor);
        self
    }

    pub fn with_cleanup_policy(mut self, policy: CleanupPolicy) -> Self {
        self.cleanup = policy;
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub async fn execute(&self, source: &str, options: ExecuteOptions) -> ExecutionResult {
        let started = Instant::now();
        let result = self.execute_inner(source, options).await;
        let elapsed = started.elapsed();
        match &result.error_kind {
            None => info!("Execution succeeded in {:.2}s", elapsed.as_secs_f64()),
            Some(kind) => info!("Execution failed ({}) in {:.2}s", kind, elapsed.as_secs_f64()),
        }
        result.with_execution_time(elapsed)
    }

    async fn execute_inner(&self, source: &str, options: ExecuteOptions) -> ExecutionResult {
        if !self.config.enabled() {
            return ExecutionResult::failure(
                ExecutionErrorKind::Disabled,
                "Sandbox execution is disabled in configuration",
            );
        }

        if options.validate {
            let report = self.validator.validate(source);
            if !report.is_valid() {
                info!("Rejected submission with {} violations", report.violations().len());
                return ExecutionResult::failure(
                    ExecutionErrorKind::Validation,
                    format!("Code validation failed: {}", report.summary()),
                )
                .with_validated(true);
            }
        }

        let workspace = match self.prepare(source) {
            Ok(workspace) => workspace,
            Err(e) => {
                return ExecutionResult::failure(
                    ExecutionErrorKind::Unexpected,
                    format!("Failed to prepare scratch directory: {}", e),
                )
                .with_validated(options.validate)
            }
        };

        let mut guard = TeardownGuard {
            runtime: self.runtime.clone(),
            security: self.security.clone(),
            container_id: None,
        };
        let result = self.run(&workspace, options, &mut guard).await;

        let container_id = guard.container_id.clone();
        let cleanup_succeeded = self.teardown(container_id.as_deref(), workspace).await;
        guard.disarm();

        result
            .with_validated(options.validate)
            .with_container(container_id, cleanup_succeeded)
    }

    fn prepare(&self, source: &str) -> sandbox_fs::Result<ScratchWorkspace> {
        match &self.scratch_root {
            Some(root) => ScratchWorkspace::create_in(root, source),
            None => ScratchWorkspace::create(source),
        }
    }

    fn active_monitor(&self) -> Option<&Arc<RuntimeSecurityMonitor>> {
        self.security.as_ref().filter(|m| m.is_enabled())
    }

    async fn run(
        &self,
        workspace: &ScratchWorkspace,
        options: ExecuteOptions,
        guard: &mut TeardownGuard,
    ) -> ExecutionResult {
        let profile_path = self.config.seccomp_profile();
        let profile = match SecurityProfile::load(profile_path) {
            Ok(Some(profile)) => Some(profile.path().to_path_buf()),
            Ok(None) => {
                warn!(
                    "Security profile {} not found; the runtime's default profile applies",
                    profile_path.display()
                );
                None
            }
            Err(e) => {
                return ExecutionResult::failure(
                    ExecutionErrorKind::Creation,
                    format!("Invalid security profile: {}", e),
                )
            }
        };

        let execution_id = Uuid::new_v4().simple().to_string();
        let spec = self.container_spec(workspace, &execution_id, profile);
        let id = match self.runtime.create(&spec).await {
            Ok(id) => id,
            Err(e) => return ExecutionResult::failure(ExecutionErrorKind::Creation, creation_message(&e)),
        };
        guard.container_id = Some(id.clone());
        debug!("Created container {} ({})", spec.name, short_id(&id));

        // surveillance begins before the workload does
        if let Some(monitor) = self.active_monitor() {
            monitor.register(&id, &spec.name);
        }
        if let Err(e) = self.runtime.start(&id).await {
            return ExecutionResult::failure(
                ExecutionErrorKind::Creation,
                format!("Failed to start container {}: {}", spec.name, e),
            );
        }

        let timeout = options.timeout.unwrap_or_else(|| self.config.timeout());
        let exit_code = match tokio::time::timeout(timeout, self.runtime.wait(&id)).await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                return ExecutionResult::failure(
                    ExecutionErrorKind::Unexpected,
                    format!("Lost track of container {}: {}", spec.name, e),
                )
            }
            Err(_) => {
                warn!("Container {} exceeded its {:?} timeout; stopping it", spec.name, timeout);
                self.terminate(&id).await;
                let logs = self.runtime.logs(&id).await.unwrap_or_default();
                return ExecutionResult::failure(
                    ExecutionErrorKind::Timeout,
                    format!("Execution timeout: exceeded {} seconds", format_seconds(timeout)),
                )
                .with_logs(logs);
            }
        };

        let logs = match self.runtime.logs(&id).await {
            Ok(logs) => logs,
            Err(e) => {
                return ExecutionResult::failure(
                    ExecutionErrorKind::Unexpected,
                    format!("Failed to read output of container {}: {}", spec.name, e),
                )
                .with_exit_code(exit_code)
            }
        };

        if let Some(kind) = self.active_monitor().and_then(|m| m.violation_for(&id)) {
            return ExecutionResult::failure(
                ExecutionErrorKind::SecurityPolicy,
                format!("Terminated by runtime security monitor: {}", kind),
            )
            .with_exit_code(exit_code)
            .with_logs(logs);
        }

        if exit_code != 0 {
            let mut message = format!("Container exited with code {}", exit_code);
            if self.was_oom_killed(&id, exit_code).await {
                message.push_str(" after exceeding its memory limit");
            }
            message.push_str(": ");
            message.push_str(tail(&logs, LOG_EXCERPT_CHARS));
            return ExecutionResult::failure(ExecutionErrorKind::Runtime, message)
                .with_exit_code(exit_code)
                .with_logs(logs);
        }

        match extract_payload(&logs) {
            Ok(Some(payload)) => ExecutionResult::success(Some(payload), logs),
            Ok(None) => {
                warn!("Container {} output carries no result markers", spec.name);
                ExecutionResult::success(None, logs)
            }
            Err(e) => ExecutionResult::failure(ExecutionErrorKind::Runtime, e.to_string())
                .with_exit_code(exit_code)
                .with_logs(logs),
        }
    }

    fn container_spec(
        &self,
        workspace: &ScratchWorkspace,
        execution_id: &str,
        seccomp_profile: Option<PathBuf>,
    ) -> ContainerSpec {
        let config = &self.config;
        let tmpfs = config.tmpfs();

        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_LABEL.to_string(), MANAGED_LABEL_VALUE.to_string());
        labels.insert(EXECUTION_LABEL.to_string(), execution_id.to_string());

        ContainerSpec {
            name: format!("sbx-{}", execution_id),
            image: config.image().to_string(),
            command: vec![
                config.interpreter().to_string(),
                "-u".to_string(),
                ScratchWorkspace::container_script_path(),
            ],
            labels,
            mounts: vec![workspace.bind_mount()],
            tmpfs: vec![TmpfsMount {
                target: tmpfs.path.clone(),
                size_bytes: tmpfs.size.bytes(),
                options: tmpfs.options.clone(),
            }],
            read_only_root: config.read_only(),
            network: config.network_mode(),
            memory_bytes: config.memory_limit().bytes(),
            memory_swap_bytes: config.memory_swap_limit().bytes(),
            cpus: config.cpu_limit(),
            pids_limit: u64::from(config.pids_limit()),
            user: config.run_as(),
            seccomp_profile,
            working_dir: Some(tmpfs.path.clone()),
        }
    }

    /// Stop with the configured grace period, then kill if still running.
    async fn terminate(&self, id: &str) {
        let grace = self.config.stop_grace();
        match tokio::time::timeout(grace + STOP_SLACK, self.runtime.stop(id, grace)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Graceful stop of {} failed: {}", id, e),
            Err(_) => warn!("Graceful stop of {} did not finish in {:?}", id, grace + STOP_SLACK),
        }

        let still_running = match self.runtime.inspect(id).await {
            Ok(Some(info)) => info.status == ContainerStatus::Running,
            Ok(None) => false,
            Err(e) => {
                debug!("Inspect after stop of {} failed: {}", id, e);
                true
            }
        };
        if still_running {
            match self.runtime.kill(id).await {
                Ok(()) => info!("Killed container {} after timeout", id),
                Err(RuntimeError::NotRunning(_)) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!("Failed to kill container {}: {}", id, e),
            }
        }
    }

    async fn was_oom_killed(&self, id: &str, exit_code: i64) -> bool {
        if exit_code != 137 {
            return false;
        }
        matches!(self.runtime.inspect(id).await, Ok(Some(info)) if info.oom_killed)
    }

    /// Deregister, remove the container and the scratch directory. Returns
    /// whether the container is gone.
    async fn teardown(&self, container_id: Option<&str>, workspace: ScratchWorkspace) -> bool {
        let container_gone = match container_id {
            None => true,
            Some(id) => {
                if let Some(monitor) = &self.security {
                    monitor.deregister(id);
                }
                if self.config.cleanup_on_exit() {
                    self.remove_container(id).await
                } else {
                    info!("Leaving container {} in place (cleanup_on_exit is off)", id);
                    false
                }
            }
        };

        // failures are logged by the workspace itself
        let _ = workspace.remove();
        container_gone
    }

    async fn remove_container(&self, id: &str) -> bool {
        self.cleanup.remove(self.runtime.as_ref(), id).await;
        let gone = match self.runtime.inspect(id).await {
            Ok(None) => true,
            Ok(Some(info)) => {
                debug!("Container {} still present with status {}", id, info.status);
                false
            }
            Err(e) => {
                warn!("Could not verify removal of container {}: {}", id, e);
                false
            }
        };
        if !gone {
            error!(
                "Container {} still exists after {} removal strategies; it has leaked",
                id,
                self.cleanup.strategies().len()
            );
        }
        gone
    }
}

fn creation_message(error: &RuntimeError) -> String {
    match error {
        RuntimeError::ImageNotFound(image) => {
            format!("Image '{}' is not available locally; pull it before running the sandbox", image)
        }
        RuntimeError::DaemonUnavailable(message) => format!("Container engine unavailable: {}", message),
        other => format!("Failed to create container: {}", other),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// `2` for whole seconds, `0.25` otherwise.
fn format_seconds(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        duration.as_secs_f64().to_string()
    }
}

/// The last `max_chars` characters of `text`.
fn tail(text: &str, max_chars: usize) -> &str {
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((start, _)) if max_chars > 0 => &text[start..],
        Some(_) => "",
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sandbox_config::{ConfigFile, SecurityMonitorSettings};
    use sandbox_proto::wrap_payload;
    use sandbox_runtime::RawStats;
    use sandbox_runtime_mock::{Call, FakeRuntime, ScriptOutcome};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    /// Stand-in for the interpreter: understands a few fixed programs.
    fn interpret(script: &str) -> ScriptOutcome {
        if script.contains("while True") {
            return ScriptOutcome::forever();
        }
        if script.contains("raise") {
            return ScriptOutcome::exit(1, "Traceback (most recent call last):\nValueError: bad input\n");
        }
        if script.contains("broken_payload") {
            return ScriptOutcome::exit(0, "__SIGNAL_JSON_START__{not json}__SIGNAL_JSON_END__\n");
        }
        if let Some(value) = script.trim().strip_prefix("signal = ") {
            let value: i64 = value.trim().parse().unwrap_or_default();
            return ScriptOutcome::exit(0, format!("working\n{}\n", wrap_payload(&json!({ "signal": value }))))
                .after(Duration::from_millis(20));
        }
        ScriptOutcome::exit(0, "hello\n")
    }

    fn config(dir: &Path, edit: impl FnOnce(&mut ConfigFile)) -> Arc<SandboxConfig> {
        let mut file = ConfigFile {
            seccomp_profile: dir.join("missing-profile.json"),
            output_dir: dir.join("out"),
            stop_grace_seconds: 0,
            ..Default::default()
        };
        edit(&mut file);
        Arc::new(SandboxConfig::try_from(file).unwrap())
    }

    fn build_executor(dir: &TempDir, runtime: &Arc<FakeRuntime>, edit: impl FnOnce(&mut ConfigFile)) -> ContainerExecutor {
        ContainerExecutor::new(config(dir.path(), edit), runtime.clone())
            .with_scratch_root(dir.path().join("scratch"))
    }

    fn scratch_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path().join("scratch"))
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn test_rejected_code_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        let result = executor
            .execute("import os\nos.system('ls')", ExecuteOptions::default())
            .await;

        assert!(!result.success);
        assert!(result.is_kind(ExecutionErrorKind::Validation));
        assert!(result.error.as_deref().unwrap().contains("os"));
        assert_eq!(result.container_id, None);
        assert!(result.cleanup_succeeded);
        assert!(result.validated);
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_sandbox() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let executor = build_executor(&dir, &runtime, |f| f.enabled = false);

        let result = executor.execute("signal = 1", ExecuteOptions::default()).await;
        assert!(result.is_kind(ExecutionErrorKind::Disabled));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_successful_run_returns_payload() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        let result = executor.execute("signal = 7", ExecuteOptions::default()).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.structured_output, Some(json!({ "signal": 7 })));
        assert_eq!(result.exit_code, Some(0));
        assert!(result.cleanup_succeeded);
        let id = result.container_id.clone().unwrap();
        assert!(!runtime.exists(&id));
        assert!(scratch_is_empty(&dir));
        assert!(result.execution_time >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_container_spec_is_locked_down() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        executor.execute("signal = 1", ExecuteOptions::default()).await;

        let specs = runtime.created_specs();
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert!(spec.name.starts_with("sbx-"));
        assert_eq!(spec.labels.get(MANAGED_LABEL).map(String::as_str), Some(MANAGED_LABEL_VALUE));
        assert!(spec.labels.contains_key(EXECUTION_LABEL));
        assert_eq!(spec.command, vec!["python3", "-u", "/sandbox/code/strategy.py"]);
        assert!(spec.mounts[0].read_only);
        assert_eq!(spec.mounts[0].target, "/sandbox/code");
        assert_eq!(spec.tmpfs[0].target, "/tmp");
        assert!(spec.read_only_root);
        assert_eq!(spec.network, sandbox_config::NetworkMode::None);
        assert_eq!(spec.memory_bytes, 2 * 1024 * 1024 * 1024);
        assert!(spec.memory_swap_bytes >= spec.memory_bytes);
        assert_eq!(spec.pids_limit, 128);
        assert_eq!(spec.user.uid, 1000);
        assert_eq!(spec.seccomp_profile, None);
    }

    #[tokio::test]
    async fn test_security_profile_handling() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join("profile.json");
        sandbox_seccomp::ProfileBuilder::default_profile().write(&profile).unwrap();

        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |f| f.seccomp_profile = profile.clone());
        let result = executor.execute("signal = 1", ExecuteOptions::default()).await;
        assert!(result.success);
        assert!(runtime.created_specs()[0].seccomp_profile.is_some());

        std::fs::write(&profile, "{ not json").unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |f| f.seccomp_profile = profile.clone());
        let result = executor.execute("signal = 1", ExecuteOptions::default()).await;
        assert!(result.is_kind(ExecutionErrorKind::Creation));
        assert!(runtime.created_specs().is_empty());
        assert!(scratch_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_missing_marker_is_success_without_payload() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        let result = executor.execute("print('hello')", ExecuteOptions::default()).await;
        assert!(result.success);
        assert_eq!(result.structured_output, None);
        assert_eq!(result.raw_logs.as_deref(), Some("hello\n"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_runtime_error() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        let result = executor.execute("broken_payload = 1", ExecuteOptions::default()).await;
        assert!(result.is_kind(ExecutionErrorKind::Runtime));
        assert!(result.cleanup_succeeded);
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code_and_output() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        let result = executor
            .execute("raise ValueError('bad input')", ExecuteOptions::default())
            .await;
        assert!(result.is_kind(ExecutionErrorKind::Runtime));
        assert_eq!(result.exit_code, Some(1));
        let error = result.error.unwrap();
        assert!(error.contains("code 1"));
        assert!(error.contains("ValueError: bad input"));
        assert!(result.cleanup_succeeded);
    }

    #[tokio::test]
    async fn test_timeout_stops_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        let timeout = Duration::from_millis(200);
        let result = executor
            .execute("while True: pass", ExecuteOptions::default().with_timeout(timeout))
            .await;

        assert!(result.is_kind(ExecutionErrorKind::Timeout));
        let error = result.error.as_deref().unwrap();
        assert!(error.contains("timeout"));
        assert!(error.contains("0.2"));
        assert!(result.execution_time >= timeout);
        assert!(result.execution_time < Duration::from_secs(3));
        assert!(result.cleanup_succeeded);
        assert!(runtime.container_ids().is_empty());
        assert_eq!(runtime.count_calls(|c| matches!(c, Call::Stop(_))), 1);
    }

    #[tokio::test]
    async fn test_missing_image_is_creation_error() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        runtime.add_missing_image("python:3.11-slim");
        let executor = build_executor(&dir, &runtime, |_| {});

        let result = executor.execute("signal = 1", ExecuteOptions::default()).await;
        assert!(result.is_kind(ExecutionErrorKind::Creation));
        assert!(result.error.unwrap().contains("python:3.11-slim"));
        assert_eq!(result.container_id, None);
        assert!(result.cleanup_succeeded);
        assert!(scratch_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_cleanup_escalates_and_reports_leaks() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        runtime.fail_removals_on_create(2);
        let result = executor.execute("signal = 1", ExecuteOptions::default()).await;
        assert!(result.success);
        assert!(result.cleanup_succeeded);

        runtime.fail_removals_on_create(3);
        let result = executor.execute("signal = 1", ExecuteOptions::default()).await;
        assert!(result.success);
        assert!(!result.cleanup_succeeded);
        assert!(runtime.exists(result.container_id.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn test_cleanup_disabled_leaves_container() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |f| f.cleanup_on_exit = false);

        let result = executor.execute("signal = 1", ExecuteOptions::default()).await;
        assert!(result.success);
        assert!(!result.cleanup_succeeded);
        assert!(runtime.exists(result.container_id.as_deref().unwrap()));
        assert!(scratch_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_independent() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        let (first, second) = tokio::join!(
            executor.execute("signal = 1", ExecuteOptions::default()),
            executor.execute("signal = 2", ExecuteOptions::default()),
        );

        assert!(first.success && second.success);
        assert_ne!(first.container_id, second.container_id);
        assert_eq!(first.structured_output, Some(json!({ "signal": 1 })));
        assert_eq!(second.structured_output, Some(json!({ "signal": 2 })));
    }

    #[tokio::test]
    async fn test_monitor_registration_brackets_the_run() {
        let dir = TempDir::new().unwrap();
        let slot: Arc<Mutex<Option<Arc<RuntimeSecurityMonitor>>>> = Arc::new(Mutex::new(None));
        let registered_at_start = Arc::new(Mutex::new(None));

        let runtime = {
            let slot = slot.clone();
            let registered_at_start = registered_at_start.clone();
            Arc::new(FakeRuntime::with_handler(move |script| {
                let count = slot.lock().as_ref().map(|m| m.registered_count());
                *registered_at_start.lock() = count;
                interpret(script)
            }))
        };
        let monitor = Arc::new(RuntimeSecurityMonitor::new(
            runtime.clone(),
            SecurityMonitorSettings::default(),
        ));
        *slot.lock() = Some(monitor.clone());

        let executor = build_executor(&dir, &runtime, |_| {}).with_security_monitor(monitor.clone());
        let result = executor.execute("signal = 3", ExecuteOptions::default()).await;

        assert!(result.success);
        assert_eq!(*registered_at_start.lock(), Some(1));
        assert_eq!(monitor.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_security_kill_is_reported() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        runtime.set_default_stats(RawStats::with_usage(90.0, 90, 100, None));
        let monitor = Arc::new(RuntimeSecurityMonitor::new(
            runtime.clone(),
            SecurityMonitorSettings {
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
        ));
        monitor.start();

        let executor = build_executor(&dir, &runtime, |_| {}).with_security_monitor(monitor.clone());
        let result = executor
            .execute(
                "while True: pass",
                ExecuteOptions::default().with_timeout(Duration::from_secs(10)),
            )
            .await;
        monitor.stop().await;

        assert!(result.is_kind(ExecutionErrorKind::SecurityPolicy));
        assert!(result.error.unwrap().contains("combined_anomaly"));
        assert!(result.execution_time < Duration::from_secs(5));
        assert!(result.cleanup_succeeded);
        assert_eq!(monitor.events().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_execution_removes_container() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::with_handler(interpret));
        let executor = build_executor(&dir, &runtime, |_| {});

        let cancelled = tokio::time::timeout(
            Duration::from_millis(100),
            executor.execute("while True: pass", ExecuteOptions::default()),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runtime.container_ids().is_empty());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(format_seconds(Duration::from_secs(2)), "2");
        assert_eq!(format_seconds(Duration::from_millis(2500)), "2.5");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ab", 0), "");
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
