//! Leveling policy.
//!
//! Points needed to leave level L: `base_points * L` (default base 100).
//! Grants carry over: 350 points from a fresh record pass level 1 (100)
//! and level 2 (200) and leave 50 of 300 at level 3.

use crate::error::{ProgressionError, Result};
use crate::record::ProgressionRecord;

/// Default points for level 1
pub const DEFAULT_BASE_POINTS: u64 = 100;

/// Threshold curve plus the carry-over rules for point grants.
///
/// Every method is pure, so the same policy can be reapplied to stored
/// records when the curve changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelingPolicy {
    base_points: u64,
}

impl LevelingPolicy {
    /// Policy with a custom base. A base of 0 would make every level free.
    pub fn new(base_points: u64) -> Result<Self> {
        if base_points == 0 {
            return Err(ProgressionError::InvalidPolicy(
                "base_points must be greater than 0".to_string(),
            ));
        }
        Ok(Self { base_points })
    }

    pub fn base_points(&self) -> u64 {
        self.base_points
    }

    /// Points required to advance past `level`. Levels below 1 count as 1.
    pub fn threshold_for_level(&self, level: u32) -> u64 {
        self.base_points.saturating_mul(u64::from(level.max(1)))
    }

    /// Fresh record: level 1, no points
    pub fn default_record(&self) -> ProgressionRecord {
        self.record_at_level(1)
    }

    /// Record sitting at the start of `level`
    pub fn record_at_level(&self, level: u32) -> ProgressionRecord {
        let level = level.max(1);
        ProgressionRecord::new(level, 0, self.threshold_for_level(level))
    }

    /// Add `delta` points and roll over as many levels as they cover.
    ///
    /// Returns the new record and the number of levels gained. Runs in
    /// constant time whatever the size of `delta`. At `u32::MAX` there is
    /// no level left to reach, so surplus points stop one short of the
    /// threshold.
    pub fn apply_delta(&self, record: ProgressionRecord, delta: u64) -> (ProgressionRecord, u32) {
        let mut level = record.level.max(1);
        let mut next = if record.points_to_next_level == 0 {
            self.threshold_for_level(level)
        } else {
            record.points_to_next_level
        };
        let mut current = record.current_points.saturating_add(delta);
        let mut gained = 0u32;

        // The stored threshold only governs the first level-up
        if current >= next && level < u32::MAX {
            current -= next;
            level += 1;
            gained = 1;
            next = self.threshold_for_level(level);
        }

        if current >= next {
            let levels = self.levels_covered(level, current);
            let spent = self.points_for_levels(level, u64::from(levels));
            current -= u64::try_from(spent).unwrap_or(current);
            level += levels;
            gained = gained.saturating_add(levels);
            next = self.threshold_for_level(level);
        }

        if current >= next {
            current = next - 1;
        }

        (ProgressionRecord::new(level, current, next), gained)
    }

    /// Points needed to climb `levels` levels starting at `level`:
    /// `base * (levels * level + levels * (levels - 1) / 2)`.
    fn points_for_levels(&self, level: u32, levels: u64) -> u128 {
        let levels = u128::from(levels);
        let steps = levels * u128::from(level) + levels * levels.saturating_sub(1) / 2;
        u128::from(self.base_points).saturating_mul(steps)
    }

    /// Most levels `points` can pay for starting at `level`.
    ///
    /// Solves the quadratic in floating point, then corrects the estimate
    /// with exact integer arithmetic.
    fn levels_covered(&self, level: u32, points: u64) -> u32 {
        let headroom = u64::from(u32::MAX - level);
        let base = self.base_points as f64;
        let linear = base * (f64::from(level) - 0.5);
        let estimate = ((linear * linear + 2.0 * base * points as f64).sqrt() - linear) / base;

        let mut levels = if estimate.is_finite() && estimate > 0.0 {
            (estimate as u64).min(headroom)
        } else {
            0
        };
        let budget = u128::from(points);
        while levels > 0 && self.points_for_levels(level, levels) > budget {
            levels -= 1;
        }
        while levels < headroom && self.points_for_levels(level, levels + 1) <= budget {
            levels += 1;
        }
        levels as u32
    }

    /// Bring a stored record in line with this policy.
    ///
    /// The stored threshold is discarded and recomputed from the level;
    /// surplus points roll over into further levels.
    pub fn normalize(&self, record: ProgressionRecord) -> ProgressionRecord {
        let base = self.record_at_level(record.level);
        self.apply_delta(base, record.current_points).0
    }
}

impl Default for LevelingPolicy {
    fn default() -> Self {
        Self {
            base_points: DEFAULT_BASE_POINTS,
        }
    }
}
