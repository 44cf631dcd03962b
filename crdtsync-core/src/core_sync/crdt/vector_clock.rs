/*
    vector_clock.rs - Vector clock for causal ordering

    Maps replica ids to logical counters. A replica only ever increments its
    own component; merging takes the component-wise maximum, with missing
    components read as 0.

    Backed by a BTreeMap so that equal clocks serialize identically.
*/

use crate::core_sync::model::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Causal relationship between two clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CausalOrdering {
    Before,
    After,
    Concurrent,
    Equal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    clock: BTreeMap<ReplicaId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        VectorClock {
            clock: BTreeMap::new(),
        }
    }

    /// Build a clock from `(replica, counter)` pairs
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<ReplicaId>,
    {
        let mut vc = VectorClock::new();
        for (replica, counter) in entries {
            vc.set(&replica.into(), counter);
        }
        vc
    }

    /// Bump the given replica's component and return the new value
    pub fn increment(&mut self, replica_id: &str) -> u64 {
        let counter = self.clock.entry(replica_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn get(&self, replica_id: &str) -> u64 {
        self.clock.get(replica_id).copied().unwrap_or(0)
    }

    /// Zero components are not stored
    pub fn set(&mut self, replica_id: &str, counter: u64) {
        if counter == 0 {
            self.clock.remove(replica_id);
        } else {
            self.clock.insert(replica_id.to_string(), counter);
        }
    }

    /// Component-wise maximum
    pub fn merge(&mut self, other: &VectorClock) {
        for (replica_id, &counter) in &other.clock {
            let current = self.clock.entry(replica_id.clone()).or_insert(0);
            *current = (*current).max(counter);
        }
    }

    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    pub fn compare(&self, other: &VectorClock) -> CausalOrdering {
        let mut less = false;
        let mut greater = false;

        for replica_id in self.clock.keys().chain(other.clock.keys()) {
            let mine = self.get(replica_id);
            let theirs = other.get(replica_id);
            if mine < theirs {
                less = true;
            } else if mine > theirs {
                greater = true;
            }
            if less && greater {
                return CausalOrdering::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => CausalOrdering::Equal,
            (true, false) => CausalOrdering::Before,
            (false, true) => CausalOrdering::After,
            (true, true) => CausalOrdering::Concurrent,
        }
    }

    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrdering::Before
    }

    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrdering::Concurrent
    }

    /// True when every component of `other` is <= ours
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other
            .clock
            .iter()
            .all(|(replica_id, &counter)| self.get(replica_id) >= counter)
    }

    /// Sum of all components; strictly grows along happened-before
    pub fn sum(&self) -> u64 {
        self.clock.values().sum()
    }

    pub fn replica_ids(&self) -> impl Iterator<Item = &ReplicaId> {
        self.clock.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, u64)> {
        self.clock.iter().map(|(r, c)| (r, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.clock.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clock.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_only_touches_own_component() {
        let mut vc = VectorClock::from_entries([("b", 4)]);
        assert_eq!(vc.increment("a"), 1);
        assert_eq!(vc.increment("a"), 2);
        assert_eq!(vc.get("a"), 2);
        assert_eq!(vc.get("b"), 4);
    }

    #[test]
    fn test_merge_takes_max_over_union() {
        let mut a = VectorClock::from_entries([("a", 3), ("b", 1)]);
        let b = VectorClock::from_entries([("b", 5), ("c", 2)]);

        a.merge(&b);

        assert_eq!(a, VectorClock::from_entries([("a", 3), ("b", 5), ("c", 2)]));
    }

    #[test]
    fn test_compare_disjoint_replicas_is_concurrent() {
        let a = VectorClock::from_entries([("A", 1)]);
        let b = VectorClock::from_entries([("B", 1)]);
        assert_eq!(a.compare(&b), CausalOrdering::Concurrent);
        assert!(a.is_concurrent(&b));
    }

    #[test]
    fn test_compare_same_replica_is_ordered() {
        let a1 = VectorClock::from_entries([("A", 1)]);
        let a2 = VectorClock::from_entries([("A", 2)]);
        assert_eq!(a1.compare(&a2), CausalOrdering::Before);
        assert_eq!(a2.compare(&a1), CausalOrdering::After);
        assert!(a1.happened_before(&a2));
    }

    #[test]
    fn test_missing_component_reads_as_zero() {
        let a = VectorClock::from_entries([("A", 1), ("B", 0)]);
        let b = VectorClock::from_entries([("A", 1)]);
        assert_eq!(a, b);
        assert_eq!(a.compare(&b), CausalOrdering::Equal);
    }

    #[test]
    fn test_dominates_and_sum() {
        let big = VectorClock::from_entries([("A", 2), ("B", 3)]);
        let small = VectorClock::from_entries([("A", 1)]);
        assert!(big.dominates(&small));
        assert!(!small.dominates(&big));
        assert!(big.dominates(&VectorClock::new()));
        assert_eq!(big.sum(), 5);
    }
}
