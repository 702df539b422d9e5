//! Property-Based Tests
//!
//! Randomized checks of the leveling invariants. Inputs come from a small
//! xorshift generator so runs are reproducible without extra crates.
//!
//! ## Invariants Tested
//!
//! - Level never decreases for non-negative grants
//! - Every grant leaves `0 <= current < next` with `next == threshold(level)`
//! - Points are conserved: total before + delta == total after
//! - Splitting a grant in two gives the same record and level count
//! - Normalising twice changes nothing
//! - Reset always yields the default record
//! - Maximal grants finish quickly and still conserve points

use progression_common::{
    LevelingPolicy, MemoryStore, NullSink, ProgressionManager, ProgressionRecord, SessionId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// TEST HELPERS
// ============================================================================

/// xorshift64
struct TestRng {
    state: u64,
}

impl TestRng {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }
}

fn total_points(policy: &LevelingPolicy, record: &ProgressionRecord) -> u64 {
    (1..record.level)
        .map(|l| policy.threshold_for_level(l))
        .sum::<u64>()
        + record.current_points
}

/// Same as `total_points` without walking every level
fn closed_form_total(policy: &LevelingPolicy, record: &ProgressionRecord) -> u128 {
    let level = u128::from(record.level);
    u128::from(policy.base_points()) * level * (level - 1) / 2 + u128::from(record.current_points)
}

fn random_policy(rng: &mut TestRng) -> LevelingPolicy {
    LevelingPolicy::new(rng.next_range(1, 250)).unwrap()
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn prop_level_monotonic_and_normalized() {
    let mut rng = TestRng::new(0x5eed_0001);
    for _ in 0..200 {
        let policy = random_policy(&mut rng);
        let mut record = policy.default_record();
        for _ in 0..50 {
            let delta = rng.next_range(0, 5_000);
            let (next, gained) = policy.apply_delta(record, delta);
            assert!(next.level >= record.level);
            assert_eq!(next.level - record.level, gained);
            assert!(next.current_points < next.points_to_next_level);
            assert_eq!(next.points_to_next_level, policy.threshold_for_level(next.level));
            record = next;
        }
    }
}

#[test]
fn prop_points_conserved() {
    let mut rng = TestRng::new(0x5eed_0002);
    for _ in 0..500 {
        let policy = random_policy(&mut rng);
        let start = policy.record_at_level(rng.next_range(1, 40) as u32);
        let delta = rng.next_range(0, 100_000);
        let (end, _) = policy.apply_delta(start, delta);
        assert_eq!(
            total_points(&policy, &end),
            total_points(&policy, &start) + delta
        );
    }
}

#[test]
fn prop_split_grant_matches_single_grant() {
    let mut rng = TestRng::new(0x5eed_0003);
    for _ in 0..500 {
        let policy = random_policy(&mut rng);
        let a = rng.next_range(0, 20_000);
        let b = rng.next_range(0, 20_000);
        let start = policy.default_record();

        let (once, gained_once) = policy.apply_delta(start, a + b);
        let (half, gained_a) = policy.apply_delta(start, a);
        let (twice, gained_b) = policy.apply_delta(half, b);

        assert_eq!(once, twice);
        assert_eq!(gained_once, gained_a + gained_b);
    }
}

#[test]
fn prop_normalize_idempotent() {
    let mut rng = TestRng::new(0x5eed_0004);
    for _ in 0..500 {
        let policy = random_policy(&mut rng);
        let raw = ProgressionRecord::new(
            rng.next_range(0, 60) as u32,
            rng.next_range(0, 50_000),
            rng.next_range(0, 10_000),
        );
        let once = policy.normalize(raw);
        assert!(once.is_normalized());
        assert_eq!(policy.normalize(once), once);
    }
}

#[test]
fn prop_reset_always_default() {
    let mut rng = TestRng::new(0x5eed_0005);
    let manager = ProgressionManager::new(Arc::new(MemoryStore::new()), LevelingPolicy::default());
    for i in 0..100 {
        let id = SessionId::from(format!("p{}", i));
        manager.attach(&id, Arc::new(NullSink));
        manager
            .grant_points(&id, rng.next_range(0, 100_000) as i64)
            .unwrap();
        if rng.next_range(0, 2) == 1 {
            manager.set_level(&id, rng.next_range(1, 90) as u32).unwrap();
        }
        assert_eq!(
            manager.reset_progress(&id).unwrap(),
            ProgressionRecord::new(1, 0, 100)
        );
        assert_eq!(manager.reset_progress(&id).unwrap(), ProgressionRecord::new(1, 0, 100));
    }
}

#[test]
fn prop_huge_grants_are_fast_and_conserve_points() {
    let mut rng = TestRng::new(0x5eed_0006);
    let manager = ProgressionManager::new(Arc::new(MemoryStore::new()), LevelingPolicy::default());
    let id = SessionId::from("whale");
    manager.attach(&id, Arc::new(NullSink));

    let started = Instant::now();
    let outcome = manager.grant_points(&id, i64::MAX).unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "max grant took {:?}",
        started.elapsed()
    );
    assert_eq!(outcome.levels_gained, outcome.record.level - 1);
    assert!(outcome.record.is_normalized());

    for _ in 0..200 {
        let policy = random_policy(&mut rng);
        let start = policy.record_at_level(rng.next_range(1, 1_000) as u32);
        // Stays below the level cap even at base 1
        let delta = rng.next_u64() >> rng.next_range(2, 20);
        let (end, gained) = policy.apply_delta(start, delta);
        assert_eq!(end.level - start.level, gained);
        assert!(end.current_points < end.points_to_next_level);
        assert_eq!(
            closed_form_total(&policy, &end),
            closed_form_total(&policy, &start) + u128::from(delta)
        );
    }
}
