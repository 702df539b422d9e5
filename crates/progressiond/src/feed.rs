//! Session event feed.
//!
//! The game server pushes one JSON object per line:
//!
//! ```text
//! {"event":"connect","session":"<uuid>"}
//! {"event":"block_broken","session":"<uuid>","block":"Rock_Stone","tool":"Tool_Pickaxe_Iron"}
//! {"event":"grant","session":"<uuid>","amount":25}
//! {"event":"disconnect","session":"<uuid>"}
//! ```
//!
//! Each event is dispatched to the manager. A failed event is logged and
//! the feed carries on.

use crate::mining::MiningRule;
use progression_common::{
    GrantOutcome, ProgressionError, ProgressionManager, ProgressionRecord, SessionId, SharedSink,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Connect {
        session: SessionId,
    },
    Disconnect {
        session: SessionId,
    },
    Grant {
        session: SessionId,
        amount: i64,
    },
    Reset {
        session: SessionId,
    },
    SetLevel {
        session: SessionId,
        level: u32,
    },
    BlockBroken {
        session: SessionId,
        block: String,
        #[serde(default)]
        tool: Option<String>,
    },
    Save,
}

/// Parse one feed line. Blank lines and `#` comments yield `None`.
pub fn parse_event(line: &str) -> Result<Option<SessionEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// What an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Attached(ProgressionRecord),
    Detached(ProgressionRecord),
    Granted(GrantOutcome),
    Updated(ProgressionRecord),
    Saved(usize),
    /// Block break that earns nothing
    Ignored,
}

/// Routes feed events into the manager.
pub struct FeedDispatcher {
    manager: Arc<ProgressionManager>,
    sink: SharedSink,
    mining: MiningRule,
    save_on_detach: bool,
}

impl FeedDispatcher {
    pub fn new(
        manager: Arc<ProgressionManager>,
        sink: SharedSink,
        mining: MiningRule,
        save_on_detach: bool,
    ) -> Self {
        Self {
            manager,
            sink,
            mining,
            save_on_detach,
        }
    }

    pub fn manager(&self) -> &Arc<ProgressionManager> {
        &self.manager
    }

    pub fn dispatch(&self, event: SessionEvent) -> Result<DispatchOutcome, ProgressionError> {
        match event {
            SessionEvent::Connect { session } => Ok(DispatchOutcome::Attached(
                self.manager.attach(&session, Arc::clone(&self.sink)),
            )),
            SessionEvent::Disconnect { session } => {
                let record = self.manager.detach(&session)?;
                if self.save_on_detach {
                    self.manager.save_all()?;
                }
                Ok(DispatchOutcome::Detached(record))
            }
            SessionEvent::Grant { session, amount } => self
                .manager
                .grant_points(&session, amount)
                .map(DispatchOutcome::Granted),
            SessionEvent::Reset { session } => self
                .manager
                .reset_progress(&session)
                .map(DispatchOutcome::Updated),
            SessionEvent::SetLevel { session, level } => self
                .manager
                .set_level(&session, level)
                .map(DispatchOutcome::Updated),
            SessionEvent::BlockBroken {
                session,
                block,
                tool,
            } => match self.mining.points_for(&block, tool.as_deref()) {
                Some(points) => {
                    let amount = i64::try_from(points).map_err(|_| {
                        ProgressionError::InvalidPolicy(format!(
                            "points_per_block {} exceeds {}",
                            points,
                            i64::MAX
                        ))
                    })?;
                    self.manager
                        .grant_points(&session, amount)
                        .map(DispatchOutcome::Granted)
                }
                None => {
                    debug!("[{}] {} earns nothing", session, block);
                    Ok(DispatchOutcome::Ignored)
                }
            },
            SessionEvent::Save => self.manager.save_all().map(DispatchOutcome::Saved),
        }
    }
}

/// Counters for one feed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub dispatched: usize,
    pub malformed: usize,
    pub failed: usize,
}

/// Read events until EOF and dispatch each one.
///
/// Manager calls take blocking locks and may write the store, so every
/// event runs on the blocking pool.
pub async fn run_feed<R>(reader: R, dispatcher: Arc<FeedDispatcher>) -> FeedStats
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Feed read failed: {}", e);
                break;
            }
        };

        let event = match parse_event(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping malformed event {:?}: {}", line, e);
                stats.malformed += 1;
                continue;
            }
        };

        let worker = Arc::clone(&dispatcher);
        match tokio::task::spawn_blocking(move || worker.dispatch(event)).await {
            Ok(Ok(outcome)) => {
                debug!("Dispatched: {:?}", outcome);
                stats.dispatched += 1;
            }
            Ok(Err(e)) => {
                warn!("Event failed ({}): {}", e.code(), e);
                stats.failed += 1;
            }
            Err(e) => {
                error!("Dispatch task panicked: {}", e);
                stats.failed += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use progression_common::{LevelingPolicy, MemoryStore, NullSink, RecordingSink};

    fn dispatcher(save_on_detach: bool) -> (FeedDispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(ProgressionManager::new(store.clone(), LevelingPolicy::default()));
        (
            FeedDispatcher::new(manager, Arc::new(NullSink), MiningRule::default(), save_on_detach),
            store,
        )
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(
            parse_event(r#"{"event":"connect","session":"abc"}"#).unwrap(),
            Some(SessionEvent::Connect {
                session: SessionId::from("abc")
            })
        );
        assert_eq!(
            parse_event(r#"{"event":"block_broken","session":"abc","block":"Rock_Stone"}"#).unwrap(),
            Some(SessionEvent::BlockBroken {
                session: SessionId::from("abc"),
                block: "Rock_Stone".to_string(),
                tool: None,
            })
        );
        assert_eq!(
            parse_event(r#"{"event":"set_level","session":"abc","level":4}"#).unwrap(),
            Some(SessionEvent::SetLevel {
                session: SessionId::from("abc"),
                level: 4,
            })
        );
        assert_eq!(parse_event(r#"{"event":"save"}"#).unwrap(), Some(SessionEvent::Save));
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert_eq!(parse_event("   ").unwrap(), None);
        assert_eq!(parse_event("# warmup").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_unknown_event() {
        assert!(parse_event(r#"{"event":"teleport","session":"abc"}"#).is_err());
        assert!(parse_event("not json").is_err());
    }

    #[test]
    fn test_full_session() {
        let (dispatcher, store) = dispatcher(true);
        let id = SessionId::from("p1");

        dispatcher
            .dispatch(SessionEvent::Connect { session: id.clone() })
            .unwrap();
        let outcome = dispatcher
            .dispatch(SessionEvent::Grant {
                session: id.clone(),
                amount: 120,
            })
            .unwrap();
        match outcome {
            DispatchOutcome::Granted(grant) => assert_eq!(grant.levels_gained, 1),
            other => panic!("unexpected outcome {:?}", other),
        }

        let outcome = dispatcher
            .dispatch(SessionEvent::Disconnect { session: id.clone() })
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Detached(ProgressionRecord::new(2, 20, 200))
        );
        // save_on_detach wrote it out
        assert_eq!(store.contents()[&id], ProgressionRecord::new(2, 20, 200));
    }

    #[test]
    fn test_block_break_eligibility() {
        let (dispatcher, _) = dispatcher(false);
        let id = SessionId::from("miner");
        dispatcher
            .dispatch(SessionEvent::Connect { session: id.clone() })
            .unwrap();

        let earned = dispatcher
            .dispatch(SessionEvent::BlockBroken {
                session: id.clone(),
                block: "Rock_Granite".to_string(),
                tool: Some("Tool_Pickaxe_Crude".to_string()),
            })
            .unwrap();
        assert!(matches!(earned, DispatchOutcome::Granted(_)));

        let ignored = dispatcher
            .dispatch(SessionEvent::BlockBroken {
                session: id.clone(),
                block: "Plant_Flower".to_string(),
                tool: Some("Tool_Pickaxe_Crude".to_string()),
            })
            .unwrap();
        assert_eq!(ignored, DispatchOutcome::Ignored);
        assert_eq!(dispatcher.manager().current_points(&id), 1);
    }

    #[test]
    fn test_oversized_block_reward_rejected_without_wrapping() {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(ProgressionManager::new(store, LevelingPolicy::default()));
        let rule = MiningRule::new(u64::MAX, &["Stone".to_string()], &["Pick".to_string()]);
        let dispatcher = FeedDispatcher::new(manager, Arc::new(NullSink), rule, false);
        let id = SessionId::from("miner");
        dispatcher
            .dispatch(SessionEvent::Connect { session: id.clone() })
            .unwrap();

        let err = dispatcher
            .dispatch(SessionEvent::BlockBroken {
                session: id.clone(),
                block: "Stone".to_string(),
                tool: Some("Pick".to_string()),
            })
            .unwrap_err();
        assert!(matches!(err, ProgressionError::InvalidPolicy(_)));
        assert_eq!(dispatcher.manager().record(&id), Some(ProgressionRecord::new(1, 0, 100)));
    }

    #[test]
    fn test_events_for_unknown_session_fail() {
        let (dispatcher, store) = dispatcher(true);
        let ghost = SessionId::from("ghost");
        let err = dispatcher
            .dispatch(SessionEvent::Grant {
                session: ghost.clone(),
                amount: 5,
            })
            .unwrap_err();
        assert!(matches!(err, ProgressionError::NotAttached { .. }));

        let err = dispatcher
            .dispatch(SessionEvent::Disconnect { session: ghost })
            .unwrap_err();
        assert!(matches!(err, ProgressionError::NotAttached { .. }));
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_sink_receives_feed_changes() {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(ProgressionManager::new(store, LevelingPolicy::default()));
        let sink = RecordingSink::shared();
        let dispatcher = FeedDispatcher::new(manager, sink.clone(), MiningRule::default(), false);
        let id = SessionId::from("p");

        dispatcher
            .dispatch(SessionEvent::Connect { session: id.clone() })
            .unwrap();
        dispatcher
            .dispatch(SessionEvent::SetLevel {
                session: id.clone(),
                level: 3,
            })
            .unwrap();
        dispatcher
            .dispatch(SessionEvent::Reset { session: id })
            .unwrap();

        assert_eq!(sink.state_changes(), 3);
        assert_eq!(sink.grants(), 0);
    }

    #[tokio::test]
    async fn test_run_feed_counts() {
        let (dispatcher, store) = dispatcher(false);
        let input = concat!(
            "{\"event\":\"connect\",\"session\":\"a\"}\n",
            "\n",
            "garbage\n",
            "{\"event\":\"grant\",\"session\":\"a\",\"amount\":-3}\n",
            "{\"event\":\"grant\",\"session\":\"a\",\"amount\":30}\n",
            "{\"event\":\"save\"}\n",
        );

        let stats = run_feed(input.as_bytes(), Arc::new(dispatcher)).await;
        assert_eq!(
            stats,
            FeedStats {
                dispatched: 3,
                malformed: 1,
                failed: 1,
            }
        );
        assert_eq!(
            store.contents()[&SessionId::from("a")],
            ProgressionRecord::new(1, 30, 100)
        );
    }
}
