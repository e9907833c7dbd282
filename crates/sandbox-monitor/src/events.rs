//! Append-only in-memory audit log of security events.

use parking_lot::Mutex;
use sandbox_proto::{SecurityEvent, ViolationKind};

#[derive(Debug, Default)]
pub struct SecurityEventLog {
    events: Mutex<Vec<SecurityEvent>>,
}

impl SecurityEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: SecurityEvent) {
        self.events.lock().push(event);
    }

    /// Copy of every event recorded so far, oldest first.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().clone()
    }

    pub fn for_container(&self, container_id: &str) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.container_id == container_id)
            .cloned()
            .collect()
    }

    pub fn count_kind(&self, kind: ViolationKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_proto::ViolationDetails;

    fn event(id: &str, kind: ViolationKind) -> SecurityEvent {
        SecurityEvent::terminate(
            id,
            format!("sbx-{}", id),
            kind,
            ViolationDetails {
                observed: 99.0,
                threshold: 95.0,
                consecutive: 3,
                secondary_observed: None,
            },
            true,
        )
    }

    #[test]
    fn test_log_keeps_insertion_order() {
        let log = SecurityEventLog::new();
        assert!(log.is_empty());

        log.record(event("a", ViolationKind::CpuSpike));
        log.record(event("b", ViolationKind::MemorySpike));
        log.record(event("a", ViolationKind::CombinedAnomaly));

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].container_id, "a");
        assert_eq!(events[2].kind, ViolationKind::CombinedAnomaly);
        assert_eq!(log.for_container("a").len(), 2);
        assert_eq!(log.count_kind(ViolationKind::MemorySpike), 1);
    }
}
