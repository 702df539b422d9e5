//! Error types for the progression store.

use crate::session::SessionId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressionError {
    #[error("{operation}: session {session} is not attached")]
    NotAttached {
        session: SessionId,
        operation: &'static str,
    },

    #[error("grant_points: invalid amount {amount} for session {session}")]
    InvalidAmount { session: SessionId, amount: i64 },

    #[error("set_level: invalid level {level} for session {session} (levels start at 1)")]
    InvalidLevel { session: SessionId, level: u32 },

    #[error("{operation} {}: {source}", .path.display())]
    PersistenceIo {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt progression data in {}: {source}", .path.display())]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid leveling policy: {0}")]
    InvalidPolicy(String),
}

impl ProgressionError {
    pub fn code(&self) -> i32 {
        match self {
            ProgressionError::NotAttached { .. } => -32010,
            ProgressionError::InvalidAmount { .. } => -32011,
            ProgressionError::InvalidLevel { .. } => -32012,
            ProgressionError::PersistenceIo { .. } => -32020,
            ProgressionError::CorruptStore { .. } => -32021,
            ProgressionError::InvalidPolicy(_) => -32030,
        }
    }

    /// Session the failed operation targeted, if any.
    pub fn session(&self) -> Option<&SessionId> {
        match self {
            ProgressionError::NotAttached { session, .. }
            | ProgressionError::InvalidAmount { session, .. }
            | ProgressionError::InvalidLevel { session, .. } => Some(session),
            _ => None,
        }
    }

    /// True for durable storage failures (load or save).
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            ProgressionError::PersistenceIo { .. } | ProgressionError::CorruptStore { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProgressionError>;
