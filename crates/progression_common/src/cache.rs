//! Live session cache.
//!
//! The map itself sits behind an `RwLock` that is only held long enough to
//! find (or insert/remove) a session's handle. Each session has its own
//! `Mutex`, so operations on one session are totally ordered while other
//! sessions proceed in parallel.
//!
//! No session lock is ever taken while the map lock is held, so a session
//! stuck in its sink only delays callers of that session. Detach marks the
//! session `attached == false` under the session lock and removes the map
//! entry afterwards; a caller holding a cloned handle sees the flag once
//! it gets the lock. Until the entry is gone, `contains`, `len` and
//! `session_ids` may still count a session whose detach is finishing.

use crate::record::ProgressionRecord;
use crate::session::SessionId;
use crate::sink::SharedSink;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Live record plus the sink that presents it.
pub struct LiveSession {
    pub record: ProgressionRecord,
    pub sink: SharedSink,
    attached: bool,
}

impl LiveSession {
    fn new(record: ProgressionRecord, sink: SharedSink) -> Self {
        Self {
            record,
            sink,
            attached: true,
        }
    }
}

type SessionHandle = Arc<Mutex<LiveSession>>;

#[derive(Default)]
pub struct ProgressionCache {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl ProgressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the live record, if attached
    pub fn get(&self, id: &SessionId) -> Option<ProgressionRecord> {
        self.with_session(id, |live| live.record)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.read().contains_key(id)
    }

    /// Install a live record, replacing any previous one for `id`.
    ///
    /// Returns the replaced record.
    pub fn put(
        &self,
        id: &SessionId,
        record: ProgressionRecord,
        sink: SharedSink,
    ) -> Option<ProgressionRecord> {
        let mut previous = None;
        self.attach_with(id, |old| previous = Some(old), || (record, sink), |_| {});
        previous
    }

    /// Detach `id` and hand back its last record.
    pub fn remove(&self, id: &SessionId) -> Option<ProgressionRecord> {
        self.remove_with(id, |record| record)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Ids of every attached session, sorted
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run `f` on the live session under its lock.
    ///
    /// The map lock is released before the session lock is taken, so a
    /// slow `f` only delays callers of the same session.
    pub fn with_session<R>(&self, id: &SessionId, f: impl FnOnce(&mut LiveSession) -> R) -> Option<R> {
        let handle = self.read().get(id).cloned()?;
        let mut live = lock(&handle);
        if !live.attached {
            // Detached between the lookup and the lock
            return None;
        }
        Some(f(&mut live))
    }

    /// Install a session, replacing any previous one.
    ///
    /// A session already attached under `id` is detached first and its
    /// final record handed to `retire` under its own lock. `install` then
    /// builds the new record and sink under the map write lock, and
    /// `announce` runs under the new session's lock once the map lock is
    /// released, so no other operation on the session is observed before it.
    pub fn attach_with<R, F, G>(
        &self,
        id: &SessionId,
        mut retire: R,
        install: F,
        announce: G,
    ) -> ProgressionRecord
    where
        R: FnMut(ProgressionRecord),
        F: FnOnce() -> (ProgressionRecord, SharedSink),
        G: FnOnce(&LiveSession),
    {
        let mut seen = self.read().get(id).cloned();
        loop {
            if let Some(old) = &seen {
                let mut old = lock(old);
                if old.attached {
                    old.attached = false;
                    retire(old.record);
                }
            }

            let mut sessions = self.write();
            let current = sessions.get(id).cloned();
            let settled = match (&current, &seen) {
                (Some(current), Some(seen)) => Arc::ptr_eq(current, seen),
                (Some(_), None) => false,
                (None, _) => true,
            };
            if !settled {
                // Another attach got in first; retire that one too
                drop(sessions);
                seen = current;
                continue;
            }

            let (record, sink) = install();
            let handle: SessionHandle = Arc::new(Mutex::new(LiveSession::new(record, sink)));
            let live = lock(&handle);
            sessions.insert(id.clone(), Arc::clone(&handle));
            drop(sessions);

            announce(&live);
            return live.record;
        }
    }

    /// Detach a session, passing its final record to `flush` under the
    /// session lock. The map entry is removed afterwards.
    pub fn remove_with<R>(&self, id: &SessionId, flush: impl FnOnce(ProgressionRecord) -> R) -> Option<R> {
        let handle = self.read().get(id).cloned()?;
        let flushed = {
            let mut live = lock(&handle);
            if !live.attached {
                return None;
            }
            live.attached = false;
            flush(live.record)
        };

        let mut sessions = self.write();
        if matches!(sessions.get(id), Some(current) if Arc::ptr_eq(current, &handle)) {
            sessions.remove(id);
        }
        Some(flushed)
    }

    /// Call `f` with every attached session's record, under that
    /// session's lock.
    ///
    /// Records are never torn, and a detach of the same session is ordered
    /// entirely before or after its visit. Returns how many sessions were
    /// visited.
    pub fn for_each_live(&self, mut f: impl FnMut(&SessionId, ProgressionRecord)) -> usize {
        let handles: Vec<(SessionId, SessionHandle)> = self
            .read()
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();

        let mut visited = 0;
        for (id, handle) in handles {
            let live = lock(&handle);
            if live.attached {
                f(&id, live.record);
                visited += 1;
            }
        }
        visited
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// A sink that panicked mid-notification must not wedge its session.
fn lock(handle: &SessionHandle) -> MutexGuard<'_, LiveSession> {
    handle.lock().unwrap_or_else(|e| e.into_inner())
}
