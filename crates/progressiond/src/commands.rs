//! Offline admin commands.
//!
//! Each command works on a manager whose store has already been loaded.
//! Mutations attach the session, apply the change, detach and save, the
//! same lifecycle a live session goes through.

use crate::log_sink::LogSink;
use anyhow::{Context, Result};
use progression_common::{ProgressionManager, SessionId};
use std::fmt::Write as _;
use std::sync::Arc;

/// One line per stored session, sorted by id
pub fn list(manager: &ProgressionManager) -> String {
    let records = manager.stored_records();
    if records.is_empty() {
        return format!("No sessions stored in {}", manager.store_location());
    }

    let mut out = String::new();
    for (id, record) in &records {
        let _ = writeln!(out, "{}  {}", id, record);
    }
    let _ = write!(out, "{} sessions", records.len());
    out
}

pub fn show(manager: &ProgressionManager, id: &SessionId) -> String {
    match manager.stored_record(id) {
        Some(record) => format!("{}: {}", id, record),
        None => format!(
            "{}: no stored progress (starts at {})",
            id,
            manager.policy().default_record()
        ),
    }
}

pub fn grant(manager: &ProgressionManager, id: &SessionId, amount: i64) -> Result<String> {
    let outcome = with_session(manager, id, |m| m.grant_points(id, amount))
        .with_context(|| format!("Failed to grant {} XP to {}", amount, id))?;
    let mut out = format!("{}: {}", id, outcome.record);
    if outcome.leveled_up() {
        let _ = write!(out, " (+{} levels)", outcome.levels_gained);
    }
    Ok(out)
}

pub fn reset(manager: &ProgressionManager, id: &SessionId) -> Result<String> {
    let record = with_session(manager, id, |m| m.reset_progress(id))
        .with_context(|| format!("Failed to reset {}", id))?;
    Ok(format!("{}: {}", id, record))
}

pub fn set_level(manager: &ProgressionManager, id: &SessionId, level: u32) -> Result<String> {
    let record = with_session(manager, id, |m| m.set_level(id, level))
        .with_context(|| format!("Failed to set level {} for {}", level, id))?;
    Ok(format!("{}: {}", id, record))
}

/// Rewrite every stored record under the configured policy
pub fn migrate(manager: &ProgressionManager) -> Result<String> {
    let changed = manager.normalize_stored();
    let total = manager
        .save_all()
        .context("Failed to write migrated store")?;
    Ok(format!("Normalized {} of {} records", changed, total))
}

fn with_session<T>(
    manager: &ProgressionManager,
    id: &SessionId,
    op: impl FnOnce(&ProgressionManager) -> progression_common::Result<T>,
) -> Result<T> {
    manager.attach(id, Arc::new(LogSink));
    let result = op(manager);
    manager.detach(id)?;
    // Only persist when the change went through
    let value = result?;
    manager.save_all()?;
    Ok(value)
}
