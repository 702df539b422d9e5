//! Durable session → record mapping.
//!
//! One JSON object for the whole store, keyed by session id:
//!
//! ```json
//! { "<session-id>": { "Level": 1, "CurrentXP": 0, "XPToNextLevel": 100 } }
//! ```
//!
//! `JsonFileStore` writes the whole file through a temp file + rename so a
//! crash mid-write never leaves a partial file. `MemoryStore` keeps the
//! mapping in memory and can be told to fail, for tests.

use crate::error::{ProgressionError, Result};
use crate::record::ProgressionRecord;
use crate::session::SessionId;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Default data file, relative to the working directory
pub const DEFAULT_DATA_FILE: &str = "data/progression.json";

/// Every stored record, sorted by session id so saved files diff cleanly.
pub type StoreSnapshot = BTreeMap<SessionId, ProgressionRecord>;

// ============================================================================
// Backend Trait
// ============================================================================

/// Where snapshots are loaded from and saved to.
pub trait StoreBackend: Send + Sync {
    /// Read the whole mapping. No durable state yet is an empty mapping.
    fn load(&self) -> Result<StoreSnapshot>;

    /// Replace the durable mapping with `snapshot`.
    fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

// ============================================================================
// JSON File Store (Production)
// ============================================================================

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `DEFAULT_DATA_FILE`
    pub fn default_location() -> Self {
        Self::new(DEFAULT_DATA_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, operation: &'static str, path: &Path, source: std::io::Error) -> ProgressionError {
        ProgressionError::PersistenceIo {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl StoreBackend for JsonFileStore {
    fn load(&self) -> Result<StoreSnapshot> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No progression data at {}, starting fresh", self.path.display());
                return Ok(StoreSnapshot::new());
            }
            Err(e) => return Err(self.io_error("read", &self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(StoreSnapshot::new());
        }

        // A bare `null` document is treated like an empty store
        let parsed: Option<StoreSnapshot> =
            serde_json::from_str(&content).map_err(|source| ProgressionError::CorruptStore {
                path: self.path.clone(),
                source,
            })?;
        Ok(parsed.unwrap_or_default())
    }

    fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot).map_err(|e| {
            self.io_error("serialize", &self.path, std::io::Error::new(ErrorKind::InvalidData, e))
        })?;
        atomic_write(&self.path, json.as_bytes())
            .map_err(|e| self.io_error("write", &self.path, e))?;
        debug!("Wrote {} records to {}", snapshot.len(), self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write `data` to `path` via a sibling temp file and rename.
///
/// The temp file is removed if any step before the rename fails.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ============================================================================
// Memory Store (Testing)
// ============================================================================

/// In-memory backend with switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreSnapshot>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `snapshot`
    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            data: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of what was last saved
    pub fn contents(&self) -> StoreSnapshot {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn injected(&self, operation: &'static str) -> ProgressionError {
        ProgressionError::PersistenceIo {
            operation,
            path: PathBuf::from(self.location()),
            source: std::io::Error::new(ErrorKind::Other, "injected failure"),
        }
    }
}

impl StoreBackend for MemoryStore {
    fn load(&self) -> Result<StoreSnapshot> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(self.injected("read"));
        }
        Ok(self.contents())
    }

    fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(self.injected("write"));
        }
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
