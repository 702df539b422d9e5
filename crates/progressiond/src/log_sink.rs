//! Notification sink that reports changes through tracing.
//!
//! Stands in for the on-screen bar when the daemon runs headless.

use progression_common::{NotificationSink, ProgressionRecord, SessionId};
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn on_state_changed(&self, session: &SessionId, record: &ProgressionRecord) {
        info!(
            "[{}] {} - {:.0}% to next level",
            session,
            record,
            record.progress() * 100.0
        );
    }

    fn on_points_granted(
        &self,
        session: &SessionId,
        record: &ProgressionRecord,
        amount: u64,
        levels_gained: u32,
    ) {
        if levels_gained > 0 {
            info!(
                "[{}] LEVEL UP! {} (+{} levels from {} XP)",
                session, record.level, levels_gained, amount
            );
        } else {
            info!(
                "[{}] +{} XP ({}/{})",
                session, amount, record.current_points, record.points_to_next_level
            );
        }
    }
}
