//! Vector clocks for cross-region causality tracking
//!
//! Each region carries a counter map keyed by region id. Incrementing bumps
//! the owning region's counter, merging takes the pointwise maximum, and
//! comparison classifies two clocks as before, after, or concurrent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Geographic region identifier
pub type RegionId = String;

/// Causal relation between two vector clocks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CausalOrder {
    /// Every counter is ≤ the other clock's and at least one is strictly less
    Before,
    /// The symmetric case
    After,
    /// Neither dominates the other. Two exactly equal clocks also compare
    /// `Concurrent`; equality carries no ordering information here.
    Concurrent,
}

/// Vector clock: per-region logical counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    counters: HashMap<RegionId, u64>,
}

impl VectorClock {
    /// Create a new empty vector clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the counter for a region (absent entries read as zero)
    pub fn get(&self, region: &str) -> u64 {
        self.counters.get(region).copied().unwrap_or(0)
    }

    /// Increment the counter for a region in place
    pub fn increment(&mut self, region: &str) {
        *self.counters.entry(region.to_string()).or_insert(0) += 1;
    }

    /// Return a copy of this clock with the region's counter incremented
    pub fn incremented(&self, region: &str) -> VectorClock {
        let mut next = self.clone();
        next.increment(region);
        next
    }

    /// Merge another clock into this one (pointwise max over the union of
    /// regions). Commutative and idempotent; never decreases any counter.
    pub fn merge(&mut self, other: &VectorClock) {
        for (region, &counter) in &other.counters {
            let entry = self.counters.entry(region.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }

    /// Classify the causal relation between two clocks
    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        let mut self_le = true;
        let mut other_le = true;

        for region in self.counters.keys().chain(other.counters.keys()) {
            let ours = self.get(region);
            let theirs = other.get(region);
            if ours > theirs {
                self_le = false;
            }
            if theirs > ours {
                other_le = false;
            }
        }

        match (self_le, other_le) {
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            // Equal clocks land here as well: (true, true) is not an ordering.
            _ => CausalOrder::Concurrent,
        }
    }

    /// True iff the clocks are ordered (`compare` is not `Concurrent`)
    pub fn causally_related(&self, other: &VectorClock) -> bool {
        self.compare(other) != CausalOrder::Concurrent
    }

    /// Regions present in this clock
    pub fn regions(&self) -> impl Iterator<Item = &RegionId> {
        self.counters.keys()
    }

    /// Number of regions with a counter
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// True if no region has ticked yet
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment() {
        let mut clock = VectorClock::new();
        assert_eq!(clock.get("us-east"), 0);
        clock.increment("us-east");
        assert_eq!(clock.get("us-east"), 1);
        clock.increment("us-east");
        assert_eq!(clock.get("us-east"), 2);
        assert_eq!(clock.get("eu-west"), 0);
    }

    #[test]
    fn test_incremented_leaves_input_untouched() {
        let clock = VectorClock::new();
        let next = clock.incremented("us-east");
        assert_eq!(clock.get("us-east"), 0);
        assert_eq!(next.get("us-east"), 1);
    }

    #[test]
    fn test_merge_pointwise_max() {
        let mut a = VectorClock::new();
        a.increment("us-east");
        a.increment("us-east");

        let mut b = VectorClock::new();
        b.increment("us-east");
        b.increment("eu-west");

        a.merge(&b);
        assert_eq!(a.get("us-east"), 2);
        assert_eq!(a.get("eu-west"), 1);
    }

    #[test]
    fn test_compare_before_after() {
        let mut a = VectorClock::new();
        a.increment("us-east");

        let mut b = a.clone();
        b.increment("us-east");

        assert_eq!(a.compare(&b), CausalOrder::Before);
        assert_eq!(b.compare(&a), CausalOrder::After);
        assert!(a.causally_related(&b));
    }

    #[test]
    fn test_compare_concurrent() {
        let mut a = VectorClock::new();
        a.increment("us-east");

        let mut b = VectorClock::new();
        b.increment("eu-west");

        assert_eq!(a.compare(&b), CausalOrder::Concurrent);
        assert_eq!(b.compare(&a), CausalOrder::Concurrent);
        assert!(!a.causally_related(&b));
    }

    #[test]
    fn test_equal_clocks_compare_concurrent() {
        let mut a = VectorClock::new();
        a.increment("us-east");
        let b = a.clone();

        assert_eq!(a.compare(&b), CausalOrder::Concurrent);
        assert!(!a.causally_related(&b));
    }

    #[test]
    fn test_empty_clock_before_any_nonempty() {
        let empty = VectorClock::new();
        let mut a = VectorClock::new();
        a.increment("asia-pacific");

        assert_eq!(empty.compare(&a), CausalOrder::Before);
        assert_eq!(a.compare(&empty), CausalOrder::After);
    }
}
