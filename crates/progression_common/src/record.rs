//! Per-session progression record.
//!
//! Field names on disk match the established data file layout:
//! `{"Level": 1, "CurrentXP": 0, "XPToNextLevel": 100}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Level 1 threshold under the default policy
pub const DEFAULT_POINTS_TO_NEXT_LEVEL: u64 = 100;

/// Level, points into the level, and points needed to leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionRecord {
    #[serde(rename = "Level")]
    pub level: u32,
    #[serde(rename = "CurrentXP")]
    pub current_points: u64,
    /// Cached threshold for `level`; recomputed from the policy whenever
    /// the level changes.
    #[serde(rename = "XPToNextLevel")]
    pub points_to_next_level: u64,
}

impl ProgressionRecord {
    pub fn new(level: u32, current_points: u64, points_to_next_level: u64) -> Self {
        Self {
            level,
            current_points,
            points_to_next_level,
        }
    }

    /// Fraction of the current level completed (0.0 - 1.0)
    pub fn progress(&self) -> f64 {
        if self.points_to_next_level == 0 {
            return 0.0;
        }
        (self.current_points as f64 / self.points_to_next_level as f64).clamp(0.0, 1.0)
    }

    /// `0 <= current_points < points_to_next_level` and `level >= 1`
    pub fn is_normalized(&self) -> bool {
        self.level >= 1
            && self.points_to_next_level > 0
            && self.current_points < self.points_to_next_level
    }
}

impl Default for ProgressionRecord {
    fn default() -> Self {
        Self {
            level: 1,
            current_points: 0,
            points_to_next_level: DEFAULT_POINTS_TO_NEXT_LEVEL,
        }
    }
}

impl fmt::Display for ProgressionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Level {} ({}/{} XP)",
            self.level, self.current_points, self.points_to_next_level
        )
    }
}
