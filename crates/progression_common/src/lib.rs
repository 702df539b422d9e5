//! Progression store shared by the progression daemon and its tools.
//!
//! Tracks level / points / points-to-next-level per session, keeps live
//! sessions in a concurrent cache, and persists everything to a single JSON
//! file. `ProgressionManager` is the entry point.

pub mod cache;
pub mod error;
pub mod leveling;
pub mod manager;
pub mod record;
pub mod session;
pub mod sink;
pub mod store;

pub use cache::ProgressionCache;
pub use error::{ProgressionError, Result};
pub use leveling::{LevelingPolicy, DEFAULT_BASE_POINTS};
pub use manager::{GrantOutcome, ProgressionManager};
pub use record::ProgressionRecord;
pub use session::SessionId;
pub use sink::{NotificationSink, NullSink, RecordingSink, SharedSink, SinkEvent};
pub use store::{atomic_write, JsonFileStore, MemoryStore, StoreBackend, StoreSnapshot, DEFAULT_DATA_FILE};
