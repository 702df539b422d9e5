//! progressiond - host for the progression store.
//!
//! Wires `progression_common` to a game server: a JSON-lines session feed,
//! block-break grants, periodic autosave and offline admin commands.

pub mod autosave;
pub mod commands;
pub mod config;
pub mod feed;
pub mod log_sink;
pub mod mining;

pub use config::{Config, ConfigOrigin};
pub use feed::{run_feed, DispatchOutcome, FeedDispatcher, FeedStats, SessionEvent};
pub use log_sink::LogSink;
pub use mining::MiningRule;
