//! Progression Manager
//!
//! Single entry point for session lifecycle, point grants, resets and
//! saves. Owns the live cache and the in-memory copy of the durable store
//! (the "snapshot").
//!
//! ## Session lifecycle
//!
//! ```text
//! Detached --attach--> Attached --grant/reset/set_level--> Attached
//!    ^                    |
//!    +------detach--------+   (final record merged into the snapshot)
//! ```
//!
//! ## Locking
//!
//! save lock → session → snapshot, and cache map → snapshot. A session
//! is never locked while the cache map is held, so a session stuck in its
//! sink only delays calls for that same session. No file I/O happens while
//! the cache or any session is locked.
//!
//! Sinks are called while their session is locked, so notifications for a
//! session arrive in order. A sink must not call back into the manager for
//! the same session.

use crate::cache::ProgressionCache;
use crate::error::{ProgressionError, Result};
use crate::leveling::LevelingPolicy;
use crate::record::ProgressionRecord;
use crate::session::SessionId;
use crate::sink::SharedSink;
use crate::store::{JsonFileStore, StoreBackend, StoreSnapshot};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Result of a successful grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantOutcome {
    pub record: ProgressionRecord,
    pub levels_gained: u32,
}

impl GrantOutcome {
    pub fn leveled_up(&self) -> bool {
        self.levels_gained > 0
    }
}

pub struct ProgressionManager {
    policy: LevelingPolicy,
    backend: Arc<dyn StoreBackend>,
    cache: ProgressionCache,
    snapshot: Mutex<StoreSnapshot>,
    save_lock: Mutex<()>,
}

impl ProgressionManager {
    pub fn new(backend: Arc<dyn StoreBackend>, policy: LevelingPolicy) -> Self {
        Self {
            policy,
            backend,
            cache: ProgressionCache::new(),
            snapshot: Mutex::new(StoreSnapshot::new()),
            save_lock: Mutex::new(()),
        }
    }

    /// Manager backed by a JSON file at `path`
    pub fn with_json_file(path: impl Into<PathBuf>, policy: LevelingPolicy) -> Self {
        Self::new(Arc::new(JsonFileStore::new(path)), policy)
    }

    pub fn policy(&self) -> &LevelingPolicy {
        &self.policy
    }

    /// Where saves go, for logs
    pub fn store_location(&self) -> String {
        self.backend.location()
    }

    // ========== Persistence ==========

    /// Populate the snapshot from durable storage. Call once at startup.
    ///
    /// On failure the snapshot is left empty (first-run state) and the
    /// error is returned for reporting; the manager stays usable.
    pub fn load(&self) -> Result<usize> {
        match self.backend.load() {
            Ok(loaded) => {
                let count = loaded.len();
                *self.snapshot() = loaded;
                info!(
                    "Loaded progression for {} sessions from {}",
                    count,
                    self.backend.location()
                );
                Ok(count)
            }
            Err(e) => {
                warn!("Failed to load progression data, starting empty: {}", e);
                self.snapshot().clear();
                Err(e)
            }
        }
    }

    /// Merge every attached record into the snapshot and write it out.
    ///
    /// Live records win over whatever the snapshot held. A failed write
    /// leaves memory as it was; the next call writes the then-current state.
    pub fn save_all(&self) -> Result<usize> {
        let _saving = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());

        self.cache.for_each_live(|id, record| {
            self.snapshot().insert(id.clone(), record);
        });
        let snapshot = self.snapshot().clone();

        let count = snapshot.len();
        if let Err(e) = self.backend.save(&snapshot) {
            warn!("Failed to save progression data: {}", e);
            return Err(e);
        }
        info!(
            "Saved progression for {} sessions to {}",
            count,
            self.backend.location()
        );
        Ok(count)
    }

    /// Re-normalise every stored record under the current policy.
    ///
    /// Returns how many records changed. Attached sessions are untouched;
    /// they were normalised on attach.
    pub fn normalize_stored(&self) -> usize {
        let mut snapshot = self.snapshot();
        let mut changed = 0;
        for record in snapshot.values_mut() {
            let normalized = self.policy.normalize(*record);
            if normalized != *record {
                *record = normalized;
                changed += 1;
            }
        }
        changed
    }

    // ========== Lifecycle ==========

    /// Start tracking a session.
    ///
    /// The prior stored record is restored (normalised) or a default one
    /// created, and `sink` gets exactly one `on_state_changed` with it.
    /// Attaching an already attached session replaces its sink; its live
    /// record is kept.
    pub fn attach(&self, id: &SessionId, sink: SharedSink) -> ProgressionRecord {
        let record = self.cache.attach_with(
            id,
            |previous| {
                self.snapshot().insert(id.clone(), previous);
            },
            || {
                let record = self
                    .snapshot()
                    .get(id)
                    .map(|stored| self.policy.normalize(*stored))
                    .unwrap_or_else(|| self.policy.default_record());
                (record, sink)
            },
            |live| live.sink.on_state_changed(id, &live.record),
        );
        info!("Attached session {}: {}", id, record);
        record
    }

    /// Stop tracking a session, flushing its final record into the snapshot
    /// in the same step.
    pub fn detach(&self, id: &SessionId) -> Result<ProgressionRecord> {
        let record = self
            .cache
            .remove_with(id, |record| {
                self.snapshot().insert(id.clone(), record);
                record
            })
            .ok_or_else(|| not_attached(id, "detach"))?;
        info!("Detached session {}: {}", id, record);
        Ok(record)
    }

    // ========== Mutations ==========

    /// Add points to an attached session.
    ///
    /// Zero is accepted and changes nothing (no notification); negative
    /// amounts are rejected.
    pub fn grant_points(&self, id: &SessionId, amount: i64) -> Result<GrantOutcome> {
        if amount < 0 {
            return Err(ProgressionError::InvalidAmount {
                session: id.clone(),
                amount,
            });
        }
        let amount = amount as u64;

        let outcome = self
            .cache
            .with_session(id, |live| {
                if amount == 0 {
                    return GrantOutcome {
                        record: live.record,
                        levels_gained: 0,
                    };
                }
                let (record, levels_gained) = self.policy.apply_delta(live.record, amount);
                live.record = record;
                live.sink.on_points_granted(id, &record, amount, levels_gained);
                GrantOutcome {
                    record,
                    levels_gained,
                }
            })
            .ok_or_else(|| not_attached(id, "grant_points"))?;

        if outcome.leveled_up() {
            info!(
                "Session {} gained {} level(s), now {}",
                id, outcome.levels_gained, outcome.record
            );
        } else {
            debug!("Session {} +{} points: {}", id, amount, outcome.record);
        }
        Ok(outcome)
    }

    /// Put an attached session back to level 1 with no points.
    pub fn reset_progress(&self, id: &SessionId) -> Result<ProgressionRecord> {
        let record = self
            .cache
            .with_session(id, |live| {
                live.record = self.policy.default_record();
                live.sink.on_state_changed(id, &live.record);
                live.record
            })
            .ok_or_else(|| not_attached(id, "reset_progress"))?;
        info!("Reset session {}", id);
        Ok(record)
    }

    /// Jump an attached session to the start of `level`.
    pub fn set_level(&self, id: &SessionId, level: u32) -> Result<ProgressionRecord> {
        if level == 0 {
            return Err(ProgressionError::InvalidLevel {
                session: id.clone(),
                level,
            });
        }
        let record = self
            .cache
            .with_session(id, |live| {
                live.record = self.policy.record_at_level(level);
                live.sink.on_state_changed(id, &live.record);
                live.record
            })
            .ok_or_else(|| not_attached(id, "set_level"))?;
        info!("Set session {} to {}", id, record);
        Ok(record)
    }

    // ========== Accessors ==========

    /// Live level, or 0 when not attached
    pub fn level(&self, id: &SessionId) -> u32 {
        self.record(id).map(|r| r.level).unwrap_or(0)
    }

    /// Live points into the current level, or 0 when not attached
    pub fn current_points(&self, id: &SessionId) -> u64 {
        self.record(id).map(|r| r.current_points).unwrap_or(0)
    }

    /// Live points needed for the next level, or 0 when not attached
    pub fn points_to_next_level(&self, id: &SessionId) -> u64 {
        self.record(id).map(|r| r.points_to_next_level).unwrap_or(0)
    }

    pub fn record(&self, id: &SessionId) -> Option<ProgressionRecord> {
        self.cache.get(id)
    }

    pub fn is_attached(&self, id: &SessionId) -> bool {
        self.cache.contains(id)
    }

    pub fn attached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn attached_sessions(&self) -> Vec<SessionId> {
        self.cache.session_ids()
    }

    /// Record as of the last load or detach (not live)
    pub fn stored_record(&self, id: &SessionId) -> Option<ProgressionRecord> {
        self.snapshot().get(id).copied()
    }

    /// Copy of the whole snapshot (not including unflushed live changes)
    pub fn stored_records(&self) -> StoreSnapshot {
        self.snapshot().clone()
    }

    fn snapshot(&self) -> MutexGuard<'_, StoreSnapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn not_attached(id: &SessionId, operation: &'static str) -> ProgressionError {
    ProgressionError::NotAttached {
        session: id.clone(),
        operation,
    }
}
