//! Notification sink interface.
//!
//! The presentation layer implements `NotificationSink`; the manager calls
//! it on every change to an attached session. Calls for one session arrive
//! in the same order as the changes they describe.

use crate::record::ProgressionRecord;
use crate::session::SessionId;
use std::sync::{Arc, Mutex};

pub trait NotificationSink: Send + Sync {
    /// Baseline or explicit-set refresh. Never implies points were gained.
    fn on_state_changed(&self, session: &SessionId, record: &ProgressionRecord);

    /// Points were added. `levels_gained >= 1` means at least one level-up.
    fn on_points_granted(
        &self,
        session: &SessionId,
        record: &ProgressionRecord,
        amount: u64,
        levels_gained: u32,
    );
}

/// Shared handle stored next to each live record
pub type SharedSink = Arc<dyn NotificationSink>;

/// Sink that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn on_state_changed(&self, _session: &SessionId, _record: &ProgressionRecord) {}

    fn on_points_granted(
        &self,
        _session: &SessionId,
        _record: &ProgressionRecord,
        _amount: u64,
        _levels_gained: u32,
    ) {
    }
}

// ============================================================================
// Recording Sink
// ============================================================================

/// One captured notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    StateChanged {
        session: SessionId,
        record: ProgressionRecord,
    },
    PointsGranted {
        session: SessionId,
        record: ProgressionRecord,
        amount: u64,
        levels_gained: u32,
    },
}

/// Sink that keeps every notification, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn state_changes(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::StateChanged { .. }))
            .count()
    }

    pub fn grants(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::PointsGranted { .. }))
            .count()
    }

    pub fn last(&self) -> Option<SinkEvent> {
        self.events().last().cloned()
    }

    fn push(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl NotificationSink for RecordingSink {
    fn on_state_changed(&self, session: &SessionId, record: &ProgressionRecord) {
        self.push(SinkEvent::StateChanged {
            session: session.clone(),
            record: *record,
        });
    }

    fn on_points_granted(
        &self,
        session: &SessionId,
        record: &ProgressionRecord,
        amount: u64,
        levels_gained: u32,
    ) {
        self.push(SinkEvent::PointsGranted {
            session: session.clone(),
            record: *record,
            amount,
            levels_gained,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        let id = SessionId::from("x");
        sink.on_state_changed(&id, &ProgressionRecord::default());
        sink.on_points_granted(&id, &ProgressionRecord::new(1, 5, 100), 5, 0);

        assert_eq!(sink.state_changes(), 1);
        assert_eq!(sink.grants(), 1);
        assert_eq!(
            sink.last(),
            Some(SinkEvent::PointsGranted {
                session: id,
                record: ProgressionRecord::new(1, 5, 100),
                amount: 5,
                levels_gained: 0,
            })
        );
    }

    #[test]
    fn test_sinks_are_object_safe() {
        let sinks: Vec<SharedSink> = vec![Arc::new(NullSink), RecordingSink::shared()];
        for sink in &sinks {
            sink.on_state_changed(&SessionId::from("y"), &ProgressionRecord::default());
        }
    }
}
