//! Prometheus metrics owned by one explicitly constructed registry.

use crate::Result;
use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use sandbox_proto::{ContainerSnapshot, ViolationKind};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

const CONTAINER_LABELS: &[&str] = &["container_id", "container_name"];

pub struct SandboxMetrics {
    registry: Registry,
    memory_usage_mb: GaugeVec,
    memory_percent: GaugeVec,
    cpu_percent: GaugeVec,
    running: IntGauge,
    orphaned: IntGauge,
    orphans_cleaned: IntCounter,
    security_events: IntCounterVec,
}

impl SandboxMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let memory_usage_mb = GaugeVec::new(
            Opts::new("sandbox_container_memory_usage_mb", "Container memory usage in MB"),
            CONTAINER_LABELS,
        )?;
        let memory_percent = GaugeVec::new(
            Opts::new("sandbox_container_memory_percent", "Container memory usage percent of its limit"),
            CONTAINER_LABELS,
        )?;
        let cpu_percent = GaugeVec::new(
            Opts::new("sandbox_container_cpu_percent", "Container CPU usage as percent of its CPU limit"),
            CONTAINER_LABELS,
        )?;
        let running = IntGauge::new("sandbox_containers_running", "Running sandbox containers")?;
        let orphaned = IntGauge::new("sandbox_containers_orphaned", "Orphaned sandbox containers")?;
        let orphans_cleaned =
            IntCounter::new("sandbox_orphans_cleaned_total", "Orphaned containers removed")?;
        let security_events = IntCounterVec::new(
            Opts::new("sandbox_security_events_total", "Runtime security violations by kind"),
            &["kind"],
        )?;

        registry.register(Box::new(memory_usage_mb.clone()))?;
        registry.register(Box::new(memory_percent.clone()))?;
        registry.register(Box::new(cpu_percent.clone()))?;
        registry.register(Box::new(running.clone()))?;
        registry.register(Box::new(orphaned.clone()))?;
        registry.register(Box::new(orphans_cleaned.clone()))?;
        registry.register(Box::new(security_events.clone()))?;

        Ok(Self {
            registry,
            memory_usage_mb,
            memory_percent,
            cpu_percent,
            running,
            orphaned,
            orphans_cleaned,
            security_events,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_container(&self, snapshot: &ContainerSnapshot) {
        let labels = [snapshot.id.as_str(), snapshot.name.as_str()];
        self.memory_usage_mb
            .with_label_values(&labels)
            .set(snapshot.memory_usage_mb());
        self.memory_percent
            .with_label_values(&labels)
            .set(snapshot.memory_percent);
        self.cpu_percent
            .with_label_values(&labels)
            .set(snapshot.cpu_percent);
    }

    /// Drop per-container series of containers that are gone.
    pub fn clear_containers(&self) {
        self.memory_usage_mb.reset();
        self.memory_percent.reset();
        self.cpu_percent.reset();
    }

    pub fn set_running(&self, count: usize) {
        self.running.set(count as i64);
    }

    pub fn set_orphaned(&self, count: usize) {
        self.orphaned.set(count as i64);
    }

    pub fn add_orphans_cleaned(&self, count: usize) {
        self.orphans_cleaned.inc_by(count as u64);
    }

    pub fn record_security_event(&self, kind: ViolationKind) {
        self.security_events.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn running(&self) -> i64 {
        self.running.get()
    }

    pub fn orphaned(&self) -> i64 {
        self.orphaned.get()
    }

    pub fn orphans_cleaned(&self) -> u64 {
        self.orphans_cleaned.get()
    }

    pub fn security_events(&self, kind: ViolationKind) -> u64 {
        self.security_events.with_label_values(&[kind.as_str()]).get()
    }

    /// Text exposition of every metric in the registry.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Router answering `GET /metrics` (and `/`) with the text exposition.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/metrics", get(scrape_handler))
            .route("/", get(scrape_handler))
            .with_state(self)
    }

    /// Serve [`SandboxMetrics::router`] on `listener` until `shutdown` turns true.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Serving metrics on {}", listener.local_addr()?);
        let signal = async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        };
        axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(signal)
            .await?;
        info!("Metrics endpoint stopped");
        Ok(())
    }
}

async fn scrape_handler(State(metrics): State<Arc<SandboxMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())], body).into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error\n").into_response()
        }
    }
}
