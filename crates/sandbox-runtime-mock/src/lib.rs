//! In-memory [`ContainerRuntime`] for tests.
//!
//! Containers never run anything. When a container starts, a handler
//! receives the submitted script and decides the exit code, the logs and
//! whether the "process" runs until it is stopped or killed.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sandbox_proto::ContainerStatus;
use sandbox_runtime::error::Error;
use sandbox_runtime::{
    ContainerInfo, ContainerRuntime, ContainerSpec, ContainerSummary, ListFilter, RawStats, Result,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Exit code reported for a killed container
pub const KILLED_EXIT_CODE: i64 = 137;

/// Exit code reported for a container stopped with the stop signal
pub const STOPPED_EXIT_CODE: i64 = 143;

/// What a started container does
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    pub exit_code: i64,
    pub logs: String,
    pub runs_forever: bool,
    pub duration: Duration,
}

impl ScriptOutcome {
    pub fn exit(exit_code: i64, logs: impl Into<String>) -> Self {
        Self {
            exit_code,
            logs: logs.into(),
            runs_forever: false,
            duration: Duration::ZERO,
        }
    }

    /// Runs until stopped or killed
    pub fn forever() -> Self {
        Self {
            runs_forever: true,
            ..Self::exit(0, "")
        }
    }

    pub fn after(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

type Handler = Arc<dyn Fn(&str) -> ScriptOutcome + Send + Sync>;

/// A recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Start(String),
    Wait(String),
    Logs(String),
    Stop(String),
    Kill(String),
    Remove { id: String, force: bool },
    Inspect(String),
    List,
    Stats(String),
}

struct FakeContainer {
    info: ContainerInfo,
    spec: Option<ContainerSpec>,
    script: String,
    outcome: Option<ScriptOutcome>,
    stats: Option<RawStats>,
    removal_failures: u32,
    halted: watch::Sender<Option<i64>>,
}

#[derive(Default)]
struct State {
    containers: BTreeMap<String, FakeContainer>,
    calls: Vec<Call>,
    next_id: u64,
    unavailable: bool,
    missing_images: HashSet<String>,
    failing_kills: HashSet<String>,
    default_stats: Option<RawStats>,
    removal_failures_on_create: u32,
    created: Vec<ContainerSpec>,
}

/// In-memory container runtime
pub struct FakeRuntime {
    state: Mutex<State>,
    handler: Handler,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    /// Every script exits 0 without output.
    pub fn new() -> Self {
        Self::with_handler(|_| ScriptOutcome::exit(0, ""))
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) -> ScriptOutcome + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(State::default()),
            handler: Arc::new(handler),
        }
    }

    /// Make every call fail as if the engine were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn add_missing_image(&self, image: impl Into<String>) {
        self.state.lock().missing_images.insert(image.into());
    }

    /// Add a container that was not created through this runtime's `create`.
    pub fn insert_container(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        status: ContainerStatus,
        labels: BTreeMap<String, String>,
    ) {
        let id = id.into();
        let info = ContainerInfo {
            id: id.clone(),
            name: name.into(),
            status,
            exit_code: (status == ContainerStatus::Exited).then_some(0),
            pid: (status == ContainerStatus::Running).then_some(1),
            oom_killed: false,
            labels,
            created_at: Some(Utc::now()),
            finished_at: None,
        };
        let (halted, _) = watch::channel(None);
        self.state.lock().containers.insert(
            id,
            FakeContainer {
                info,
                spec: None,
                script: String::new(),
                outcome: None,
                stats: None,
                removal_failures: 0,
                halted,
            },
        );
    }

    /// Stats returned for `id` from now on.
    pub fn set_stats(&self, id: &str, stats: RawStats) {
        if let Some(container) = self.state.lock().containers.get_mut(id) {
            container.stats = Some(stats);
        }
    }

    /// Make every kill of `id` fail.
    pub fn fail_kills(&self, id: &str) {
        self.state.lock().failing_kills.insert(id.to_string());
    }

    /// Make the next `count` removals of `id` fail.
    pub fn fail_removals(&self, id: &str, count: u32) {
        if let Some(container) = self.state.lock().containers.get_mut(id) {
            container.removal_failures = count;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn kill_count(&self, id: &str) -> usize {
        self.count_calls(|c| matches!(c, Call::Kill(k) if k == id))
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.state.lock().containers.keys().cloned().collect()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.state.lock().containers.contains_key(id)
    }

    /// Stats returned for containers without their own.
    pub fn set_default_stats(&self, stats: RawStats) {
        self.state.lock().default_stats = Some(stats);
    }

    /// Containers created from now on fail their first `count` removals.
    pub fn fail_removals_on_create(&self, count: u32) {
        self.state.lock().removal_failures_on_create = count;
    }

    /// Every spec passed to `create`, in order.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().created.clone()
    }

    /// Script `id` was created with, read from its code mount.
    pub fn script_of(&self, id: &str) -> Option<String> {
        self.state.lock().containers.get(id).map(|c| c.script.clone())
    }

    /// Ids of containers currently running.
    pub fn running_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .containers
            .values()
            .filter(|c| c.info.status == ContainerStatus::Running)
            .map(|c| c.info.id.clone())
            .collect()
    }

    fn enter(&self, call: Call) -> Result<parking_lot::MutexGuard<'_, State>> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.unavailable {
            return Err(Error::DaemonUnavailable("fake runtime is down".into()));
        }
        Ok(state)
    }

    fn halt(container: &mut FakeContainer, exit_code: i64) {
        container.info.status = ContainerStatus::Exited;
        container.info.exit_code = Some(exit_code);
        container.info.pid = None;
        container.info.finished_at = Some(Utc::now());
        container.halted.send_replace(Some(exit_code));
    }
}

fn read_script(spec: &ContainerSpec) -> String {
    spec.mounts
        .iter()
        .map(|m| m.source.join(sandbox_fs::SCRIPT_NAME))
        .find_map(|path| std::fs::read_to_string(path).ok())
        .unwrap_or_default()
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ping(&self) -> Result<()> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(Error::DaemonUnavailable("fake runtime is down".into()));
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let script = read_script(spec);
        let mut state = self.enter(Call::Create(spec.name.clone()))?;
        if state.missing_images.contains(&spec.image) {
            return Err(Error::ImageNotFound(spec.image.clone()));
        }
        state.next_id += 1;
        let id = format!("fake{:012}", state.next_id);
        let (halted, _) = watch::channel(None);
        let container = FakeContainer {
            info: ContainerInfo {
                id: id.clone(),
                name: spec.name.clone(),
                status: ContainerStatus::Created,
                exit_code: None,
                pid: None,
                oom_killed: false,
                labels: spec.labels.clone(),
                created_at: Some(Utc::now()),
                finished_at: None,
            },
            spec: Some(spec.clone()),
            script,
            outcome: None,
            stats: None,
            removal_failures: state.removal_failures_on_create,
            halted,
        };
        state.containers.insert(id.clone(), container);
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        let script = {
            let state = self.enter(Call::Start(id.to_string()))?;
            let container = state
                .containers
                .get(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            container.script.clone()
        };
        let outcome = (self.handler)(&script);

        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        container.info.status = ContainerStatus::Running;
        container.info.pid = Some(1000 + container.info.id.len() as u32);
        container.outcome = Some(outcome);
        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        let (outcome, mut halted) = {
            let state = self.enter(Call::Wait(id.to_string()))?;
            let container = state
                .containers
                .get(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            if let Some(code) = *container.halted.borrow() {
                return Ok(code);
            }
            let outcome = container.outcome.clone().unwrap_or_else(|| ScriptOutcome::exit(0, ""));
            (outcome, container.halted.subscribe())
        };

        let halted_code = async {
            loop {
                if let Some(code) = *halted.borrow_and_update() {
                    return Some(code);
                }
                if halted.changed().await.is_err() {
                    return None;
                }
            }
        };

        if outcome.runs_forever {
            return halted_code
                .await
                .ok_or_else(|| Error::NotFound(id.to_string()));
        }

        tokio::select! {
            code = halted_code => code.ok_or_else(|| Error::NotFound(id.to_string())),
            _ = tokio::time::sleep(outcome.duration) => {
                let mut state = self.state.lock();
                let container = state
                    .containers
                    .get_mut(id)
                    .ok_or_else(|| Error::NotFound(id.to_string()))?;
                if let Some(code) = *container.halted.borrow() {
                    return Ok(code);
                }
                Self::halt(container, outcome.exit_code);
                Ok(outcome.exit_code)
            }
        }
    }

    async fn logs(&self, id: &str) -> Result<String> {
        let state = self.enter(Call::Logs(id.to_string()))?;
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(container
            .outcome
            .as_ref()
            .map(|o| o.logs.clone())
            .unwrap_or_default())
    }

    async fn stop(&self, id: &str, _grace: Duration) -> Result<()> {
        let mut state = self.enter(Call::Stop(id.to_string()))?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if container.info.status == ContainerStatus::Running {
            Self::halt(container, STOPPED_EXIT_CODE);
        }
        Ok(())
    }

    async fn kill(&self, id: &str) -> Result<()> {
        let mut state = self.enter(Call::Kill(id.to_string()))?;
        if state.failing_kills.contains(id) {
            return Err(Error::CommandFailed {
                command: "fake kill".into(),
                code: Some(1),
                stderr: "permission denied".into(),
            });
        }
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if container.info.status != ContainerStatus::Running {
            return Err(Error::NotRunning(id.to_string()));
        }
        Self::halt(container, KILLED_EXIT_CODE);
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.enter(Call::Remove {
            id: id.to_string(),
            force,
        })?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if container.removal_failures > 0 {
            container.removal_failures -= 1;
            return Err(Error::CommandFailed {
                command: "fake rm".into(),
                code: Some(1),
                stderr: "removal in progress".into(),
            });
        }
        if container.info.status == ContainerStatus::Running {
            if !force {
                return Err(Error::CommandFailed {
                    command: "fake rm".into(),
                    code: Some(1),
                    stderr: format!("cannot remove running container {}", id),
                });
            }
            Self::halt(container, KILLED_EXIT_CODE);
        }
        state.containers.remove(id);
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<Option<ContainerInfo>> {
        let state = self.enter(Call::Inspect(id.to_string()))?;
        Ok(state.containers.get(id).map(|c| c.info.clone()))
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>> {
        let state = self.enter(Call::List)?;
        Ok(state
            .containers
            .values()
            .filter(|c| filter.matches(&c.info.labels, c.info.status))
            .map(|c| ContainerSummary {
                id: c.info.id.clone(),
                name: c.info.name.clone(),
                status: c.info.status,
            })
            .collect())
    }

    async fn stats(&self, id: &str) -> Result<RawStats> {
        let state = self.enter(Call::Stats(id.to_string()))?;
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if container.info.status != ContainerStatus::Running {
            return Err(Error::NotRunning(id.to_string()));
        }
        let limit = container.spec.as_ref().map_or(0, |s| s.memory_bytes);
        Ok(container
            .stats
            .or(state.default_stats)
            .unwrap_or_else(|| RawStats::steady(0, limit)))
    }
}
