//! Periodic background task with idempotent start and bounded stop.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct BackgroundLoop {
    name: &'static str,
    running: Mutex<Option<Running>>,
}

impl BackgroundLoop {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map_or(false, |r| !r.handle.is_finished())
    }

    /// Run `tick` every `interval` until stopped. Returns false if the loop
    /// was already running. Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, interval: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.as_ref().map_or(false, |r| !r.handle.is_finished()) {
            return false;
        }

        let (shutdown, mut stop_rx) = watch::channel(false);
        let name = self.name;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tick().await,
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("{} loop exited", name);
        });
        debug!("{} loop started with interval {:?}", self.name, interval);
        *running = Some(Running { shutdown, handle });
        true
    }

    /// Signal the loop and wait up to `timeout` for it to exit. A loop that
    /// does not exit in time is aborted and false is returned.
    pub async fn stop(&self, timeout: Duration) -> bool {
        let running = self.running.lock().take();
        let Some(mut running) = running else {
            return true;
        };
        let _ = running.shutdown.send(true);
        match tokio::time::timeout(timeout, &mut running.handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!("{} loop did not stop within {:?}; aborting it", self.name, timeout);
                running.handle.abort();
                false
            }
        }
    }
}

impl Drop for BackgroundLoop {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.handle.abort();
        }
    }
}
