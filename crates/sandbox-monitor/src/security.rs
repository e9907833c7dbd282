//! Runtime security monitor.
//!
//! Polls every registered container on a background loop and kills it on a
//! sustained CPU or memory spike, a combined anomaly, or (when a pid
//! threshold is configured) a suspected fork bomb. Each container is killed
//! at most once; the kill is audited as a [`SecurityEvent`].
//!
//! The registry lock is only held for map operations. Stats queries and
//! kills run without it.

use crate::events::SecurityEventLog;
use crate::metrics::SandboxMetrics;
use crate::BackgroundLoop;
use parking_lot::{Mutex, RwLock};
use sandbox_config::SecurityMonitorSettings;
use sandbox_proto::{memory_percent, SecurityEvent, ViolationDetails, ViolationKind};
use sandbox_runtime::error::Error as RuntimeError;
use sandbox_runtime::ContainerRuntime;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long `stop` waits for the polling loop to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Notification callback invoked synchronously for every enforced violation
pub trait SecurityAlertHandler: Send + Sync {
    fn on_violation(&self, event: &SecurityEvent) -> HandlerResult;
}

impl<F> SecurityAlertHandler for F
where
    F: Fn(&SecurityEvent) -> HandlerResult + Send + Sync,
{
    fn on_violation(&self, event: &SecurityEvent) -> HandlerResult {
        self(event)
    }
}

#[derive(Debug)]
struct MonitoredContainer {
    name: String,
    cpu_flags: VecDeque<bool>,
    memory_flags: VecDeque<bool>,
    last_checked: Option<Instant>,
    kill_attempted: bool,
    violation: Option<ViolationKind>,
}

impl MonitoredContainer {
    fn new(name: String, window: usize) -> Self {
        Self {
            name,
            cpu_flags: VecDeque::with_capacity(window),
            memory_flags: VecDeque::with_capacity(window),
            last_checked: None,
            kill_attempted: false,
            violation: None,
        }
    }
}

fn push_flag(window: &mut VecDeque<bool>, flag: bool, size: usize) {
    if window.len() == size {
        window.pop_front();
    }
    window.push_back(flag);
}

/// True when the last `count` flags exist and are all set.
fn sustained(window: &VecDeque<bool>, count: usize) -> bool {
    count > 0 && window.len() >= count && window.iter().rev().take(count).all(|f| *f)
}

pub struct RuntimeSecurityMonitor {
    runtime: Arc<dyn ContainerRuntime>,
    settings: SecurityMonitorSettings,
    registry: Mutex<HashMap<String, MonitoredContainer>>,
    events: Arc<SecurityEventLog>,
    metrics: Option<Arc<SandboxMetrics>>,
    handlers: RwLock<Vec<Arc<dyn SecurityAlertHandler>>>,
    background: BackgroundLoop,
}

impl RuntimeSecurityMonitor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: SecurityMonitorSettings) -> Self {
        Self {
            runtime,
            settings,
            registry: Mutex::new(HashMap::new()),
            events: Arc::new(SecurityEventLog::new()),
            metrics: None,
            handlers: RwLock::new(Vec::new()),
            background: BackgroundLoop::new("security monitor"),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SandboxMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_event_log(mut self, events: Arc<SecurityEventLog>) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &SecurityMonitorSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn events(&self) -> &Arc<SecurityEventLog> {
        &self.events
    }

    pub fn add_handler(&self, handler: Arc<dyn SecurityAlertHandler>) {
        self.handlers.write().push(handler);
    }

    /// Start watching `id`. Registering an id twice resets its history.
    pub fn register(&self, id: &str, name: &str) {
        let state = MonitoredContainer::new(name.to_string(), self.settings.window_size);
        self.registry.lock().insert(id.to_string(), state);
        debug!("Security monitor watching {} ({})", name, id);
    }

    /// Stop watching `id`; returns the violation it was killed for, if any.
    pub fn deregister(&self, id: &str) -> Option<ViolationKind> {
        let state = self.registry.lock().remove(id);
        if state.is_some() {
            debug!("Security monitor released {}", id);
        }
        state.and_then(|s| s.violation)
    }

    pub fn violation_for(&self, id: &str) -> Option<ViolationKind> {
        self.registry.lock().get(id).and_then(|s| s.violation)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.registry.lock().contains_key(id)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.registry.lock().keys().cloned().collect()
    }

    pub fn registered_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn last_checked(&self, id: &str) -> Option<Instant> {
        self.registry.lock().get(id).and_then(|s| s.last_checked)
    }

    pub fn is_running(&self) -> bool {
        self.background.is_running()
    }

    /// Start the polling loop. Returns false when disabled or already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.settings.enabled {
            info!("Runtime security monitor disabled");
            return false;
        }
        let monitor: Weak<Self> = Arc::downgrade(self);
        let started = self.background.start(self.settings.poll_interval, move || {
            let monitor = monitor.clone();
            async move {
                if let Some(monitor) = monitor.upgrade() {
                    monitor.poll_once().await;
                }
            }
        });
        if started {
            info!(
                "Runtime security monitor started (poll every {:?})",
                self.settings.poll_interval
            );
        }
        started
    }

    /// Stop the polling loop, waiting at most [`STOP_TIMEOUT`].
    pub async fn stop(&self) -> bool {
        let stopped = self.background.stop(STOP_TIMEOUT).await;
        if stopped {
            info!("Runtime security monitor stopped");
        }
        stopped
    }

    /// Run one poll cycle over every registered container not yet killed.
    /// Returns the events recorded during this cycle.
    pub async fn poll_once(&self) -> Vec<SecurityEvent> {
        let targets: Vec<String> = self
            .registry
            .lock()
            .iter()
            .filter(|(_, state)| !state.kill_attempted)
            .map(|(id, _)| id.clone())
            .collect();

        let mut events = Vec::new();
        for id in targets {
            if let Some(event) = self.check(&id).await {
                events.push(event);
            }
        }
        events
    }

    async fn check(&self, id: &str) -> Option<SecurityEvent> {
        let stats = match self.runtime.stats(id).await {
            Ok(stats) => stats,
            Err(RuntimeError::NotRunning(_)) => return None,
            Err(e) if e.is_not_found() => {
                debug!("Monitored container {} is gone", id);
                return None;
            }
            Err(e) => {
                warn!("Security monitor could not read stats of {}: {}", id, e);
                return None;
            }
        };
        let cpu = stats.cpu_percent_of(self.settings.cpu_quota);
        let memory = memory_percent(stats.memory_usage(), stats.memory_limit());
        let pids = stats.pids();

        let (name, kind, details) = {
            let mut registry = self.registry.lock();
            let state = registry.get_mut(id)?;
            if state.kill_attempted {
                return None;
            }
            state.last_checked = Some(Instant::now());
            let window = self.settings.window_size.max(1);
            push_flag(&mut state.cpu_flags, cpu >= self.settings.cpu_threshold, window);
            push_flag(&mut state.memory_flags, memory >= self.settings.memory_threshold, window);

            let (kind, details) = self.evaluate(state, cpu, memory, pids)?;
            state.kill_attempted = true;
            state.violation = Some(kind);
            (state.name.clone(), kind, details)
        };

        warn!(
            "Security violation {} in {} ({}): observed {:.1} threshold {:.1}; terminating",
            kind, name, id, details.observed, details.threshold
        );
        let succeeded = match self.runtime.kill(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to kill {} after {}: {}", id, kind, e);
                false
            }
        };

        let event = SecurityEvent::terminate(id, name, kind, details, succeeded);
        self.events.record(event.clone());
        if let Some(metrics) = &self.metrics {
            metrics.record_security_event(kind);
        }
        self.notify(&event);
        Some(event)
    }

    fn evaluate(
        &self,
        state: &MonitoredContainer,
        cpu: f64,
        memory: f64,
        pids: Option<u64>,
    ) -> Option<(ViolationKind, ViolationDetails)> {
        let settings = &self.settings;
        if sustained(&state.cpu_flags, settings.cpu_consecutive) {
            return Some((
                ViolationKind::CpuSpike,
                ViolationDetails {
                    observed: cpu,
                    threshold: settings.cpu_threshold,
                    consecutive: settings.cpu_consecutive as u32,
                    secondary_observed: None,
                },
            ));
        }
        if sustained(&state.memory_flags, settings.memory_consecutive) {
            return Some((
                ViolationKind::MemorySpike,
                ViolationDetails {
                    observed: memory,
                    threshold: settings.memory_threshold,
                    consecutive: settings.memory_consecutive as u32,
                    secondary_observed: None,
                },
            ));
        }
        if cpu >= settings.combined_threshold && memory >= settings.combined_threshold {
            return Some((
                ViolationKind::CombinedAnomaly,
                ViolationDetails {
                    observed: cpu,
                    threshold: settings.combined_threshold,
                    consecutive: 1,
                    secondary_observed: Some(memory),
                },
            ));
        }
        match (settings.pids_threshold, pids) {
            (Some(threshold), Some(pids)) if pids >= threshold => Some((
                ViolationKind::ForkBombSuspected,
                ViolationDetails {
                    observed: pids as f64,
                    threshold: threshold as f64,
                    consecutive: 1,
                    secondary_observed: None,
                },
            )),
            _ => None,
        }
    }

    fn notify(&self, event: &SecurityEvent) {
        let handlers: Vec<_> = self.handlers.read().clone();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.on_violation(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Security alert handler failed: {}", e),
                Err(_) => error!("Security alert handler panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_proto::ContainerStatus;
    use sandbox_runtime::RawStats;
    use sandbox_runtime_mock::FakeRuntime;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MIB: u64 = 1024 * 1024;

    fn setup(settings: SecurityMonitorSettings) -> (Arc<FakeRuntime>, RuntimeSecurityMonitor) {
        let runtime = Arc::new(FakeRuntime::new());
        let monitor = RuntimeSecurityMonitor::new(runtime.clone(), settings);
        (runtime, monitor)
    }

    fn running(runtime: &FakeRuntime, monitor: &RuntimeSecurityMonitor, id: &str, stats: RawStats) {
        runtime.insert_container(id, format!("sbx-{}", id), ContainerStatus::Running, BTreeMap::new());
        runtime.set_stats(id, stats);
        monitor.register(id, &format!("sbx-{}", id));
    }

    #[tokio::test]
    async fn test_cpu_spike_needs_consecutive_polls() {
        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        running(&runtime, &monitor, "c1", RawStats::with_usage(99.0, 10 * MIB, 100 * MIB, None));

        assert!(monitor.poll_once().await.is_empty());
        assert!(monitor.poll_once().await.is_empty());
        assert_eq!(runtime.kill_count("c1"), 0);

        let events = monitor.poll_once().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ViolationKind::CpuSpike);
        assert_eq!(events[0].details.consecutive, 3);
        assert!(events[0].action_succeeded);
        assert_eq!(runtime.kill_count("c1"), 1);
        assert_eq!(monitor.violation_for("c1"), Some(ViolationKind::CpuSpike));
    }

    #[tokio::test]
    async fn test_cpu_spike_measured_against_quota() {
        // A container pinned at its 0.5 core limit reads 50% of one core.
        let (runtime, monitor) = setup(SecurityMonitorSettings {
            cpu_quota: Some(0.5),
            ..Default::default()
        });
        running(&runtime, &monitor, "c1", RawStats::with_usage(49.0, 10 * MIB, 100 * MIB, None));

        for _ in 0..2 {
            assert!(monitor.poll_once().await.is_empty());
        }
        let events = monitor.poll_once().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ViolationKind::CpuSpike);
        assert!((events[0].details.observed - 98.0).abs() < 0.01);

        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        running(&runtime, &monitor, "c2", RawStats::with_usage(49.0, 10 * MIB, 100 * MIB, None));
        for _ in 0..5 {
            assert!(monitor.poll_once().await.is_empty());
        }
        assert_eq!(runtime.kill_count("c2"), 0);
    }

    #[tokio::test]
    async fn test_transient_spike_is_ignored() {
        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        running(&runtime, &monitor, "c1", RawStats::with_usage(99.0, 0, 100 * MIB, None));
        monitor.poll_once().await;
        monitor.poll_once().await;
        runtime.set_stats("c1", RawStats::with_usage(10.0, 0, 100 * MIB, None));
        monitor.poll_once().await;
        runtime.set_stats("c1", RawStats::with_usage(99.0, 0, 100 * MIB, None));
        monitor.poll_once().await;
        monitor.poll_once().await;

        assert_eq!(runtime.kill_count("c1"), 0);
        assert!(monitor.events().is_empty());
    }

    #[tokio::test]
    async fn test_memory_spike_after_two_polls() {
        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        running(&runtime, &monitor, "m1", RawStats::with_usage(5.0, 98 * MIB, 100 * MIB, None));

        assert!(monitor.poll_once().await.is_empty());
        let events = monitor.poll_once().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ViolationKind::MemorySpike);
        assert!((events[0].details.observed - 98.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_combined_anomaly_is_instantaneous() {
        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        running(&runtime, &monitor, "x", RawStats::with_usage(85.0, 85 * MIB, 100 * MIB, None));

        let events = monitor.poll_once().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ViolationKind::CombinedAnomaly);
        assert_eq!(events[0].details.secondary_observed.map(|m| m.round()), Some(85.0));
    }

    #[tokio::test]
    async fn test_fork_bomb_only_when_threshold_set() {
        let stats = RawStats::with_usage(1.0, MIB, 100 * MIB, Some(500));

        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        running(&runtime, &monitor, "f", stats);
        assert!(monitor.poll_once().await.is_empty());

        let (runtime, monitor) = setup(SecurityMonitorSettings {
            pids_threshold: Some(100),
            ..Default::default()
        });
        running(&runtime, &monitor, "f", stats);
        let events = monitor.poll_once().await;
        assert_eq!(events[0].kind, ViolationKind::ForkBombSuspected);
        assert_eq!(events[0].details.observed, 500.0);
    }

    #[tokio::test]
    async fn test_kill_happens_once() {
        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        running(&runtime, &monitor, "x", RawStats::with_usage(90.0, 90 * MIB, 100 * MIB, None));

        assert_eq!(monitor.poll_once().await.len(), 1);
        // still registered; container revived to make sure no second kill is attempted
        runtime.insert_container("x", "sbx-x", ContainerStatus::Running, BTreeMap::new());
        runtime.set_stats("x", RawStats::with_usage(90.0, 90 * MIB, 100 * MIB, None));
        for _ in 0..5 {
            assert!(monitor.poll_once().await.is_empty());
        }
        assert_eq!(runtime.kill_count("x"), 1);
        assert_eq!(monitor.events().len(), 1);
        assert_eq!(monitor.deregister("x"), Some(ViolationKind::CombinedAnomaly));
        assert!(!monitor.is_registered("x"));
    }

    #[tokio::test]
    async fn test_failed_kill_is_recorded() {
        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        running(&runtime, &monitor, "x", RawStats::with_usage(90.0, 90 * MIB, 100 * MIB, None));
        runtime.fail_kills("x");

        let events = monitor.poll_once().await;
        assert_eq!(events.len(), 1);
        assert!(!events[0].action_succeeded);
    }

    #[tokio::test]
    async fn test_missing_container_does_not_stop_others() {
        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        monitor.register("ghost", "sbx-ghost");
        running(&runtime, &monitor, "x", RawStats::with_usage(90.0, 90 * MIB, 100 * MIB, None));

        let events = monitor.poll_once().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].container_id, "x");
        assert!(monitor.is_registered("ghost"));
    }

    #[tokio::test]
    async fn test_handler_failures_are_isolated() {
        let (runtime, monitor) = setup(SecurityMonitorSettings::default());
        let calls = Arc::new(AtomicUsize::new(0));

        monitor.add_handler(Arc::new(|_: &SecurityEvent| -> HandlerResult { panic!("boom") }));
        monitor.add_handler(Arc::new(|_: &SecurityEvent| -> HandlerResult { Err("nope".into()) }));
        let counter = calls.clone();
        monitor.add_handler(Arc::new(move |_: &SecurityEvent| -> HandlerResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        running(&runtime, &monitor, "a", RawStats::with_usage(90.0, 90 * MIB, 100 * MIB, None));
        running(&runtime, &monitor, "b", RawStats::with_usage(90.0, 90 * MIB, 100 * MIB, None));

        assert_eq!(monitor.poll_once().await.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_background_loop_enforces() {
        let runtime = Arc::new(FakeRuntime::new());
        let metrics = Arc::new(SandboxMetrics::new().unwrap());
        let monitor = Arc::new(
            RuntimeSecurityMonitor::new(
                runtime.clone(),
                SecurityMonitorSettings {
                    poll_interval: Duration::from_millis(20),
                    ..Default::default()
                },
            )
            .with_metrics(metrics.clone()),
        );
        running(&runtime, &monitor, "x", RawStats::with_usage(90.0, 90 * MIB, 100 * MIB, None));

        assert!(monitor.start());
        assert!(!monitor.start());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(monitor.stop().await);

        assert_eq!(runtime.kill_count("x"), 1);
        assert_eq!(metrics.security_events(ViolationKind::CombinedAnomaly), 1);
    }

    #[tokio::test]
    async fn test_disabled_monitor_does_not_start() {
        let (_, monitor) = setup(SecurityMonitorSettings {
            enabled: false,
            ..Default::default()
        });
        let monitor = Arc::new(monitor);
        assert!(!monitor.start());
        assert!(!monitor.is_running());
    }
}
