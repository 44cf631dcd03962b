/*
    state.rs - Replicated state of one CRDT instance

    Owned by the synchronizer's registry, keyed by CRDT id. Mutated only
    through apply, merge and compaction.
*/

use super::operation::CrdtOperation;
use super::types::{CrdtId, Millis, ReplicaId};
use crate::core_sync::crdt::{CrdtData, CrdtKind, VectorClock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdtState {
    pub id: CrdtId,
    pub kind: CrdtKind,
    /// Replica that created this instance
    pub owner: ReplicaId,
    /// Object clock: join of every applied operation and merged state
    pub vector_clock: VectorClock,
    pub data: CrdtData,
    /// History in canonical order, possibly compacted
    pub operations: Vec<CrdtOperation>,
    pub version: u64,
    pub last_modified: Millis,
}

impl CrdtState {
    pub fn value(&self) -> serde_json::Value {
        self.data.value()
    }

    pub fn contains_operation(&self, op: &CrdtOperation) -> bool {
        self.operations.iter().any(|o| o.id == op.id)
    }

    /// Operations not causally dominated by any other operation in the history
    pub fn heads(&self) -> Vec<&CrdtOperation> {
        self.operations
            .iter()
            .filter(|candidate| {
                !self
                    .operations
                    .iter()
                    .any(|other| candidate.vector_clock.happened_before(&other.vector_clock))
            })
            .collect()
    }

    /// Remote operations that are neither in our history nor covered by our clock
    pub fn missing_from<'a>(&self, remote: &'a CrdtState) -> Vec<&'a CrdtOperation> {
        let known: HashSet<_> = self.operations.iter().map(|o| &o.id).collect();
        remote
            .operations
            .iter()
            .filter(|op| !known.contains(&op.id) && !op.is_covered_by(&self.vector_clock))
            .collect()
    }

    /// Delta state for a peer whose object clock for this CRDT is `peer`.
    /// `None` when the peer already has everything.
    pub fn delta_for(&self, peer: Option<&VectorClock>) -> Option<CrdtState> {
        match peer {
            None => Some(self.clone()),
            Some(peer) if peer.dominates(&self.vector_clock) => None,
            Some(peer) => {
                let mut delta = self.clone();
                delta.operations.retain(|op| !op.is_covered_by(peer));
                Some(delta)
            }
        }
    }

    /// Drop the oldest history entries beyond `retain`; returns how many were dropped
    pub fn compact(&mut self, threshold: usize, retain: usize) -> usize {
        if self.operations.len() <= threshold {
            return 0;
        }
        let excess = self.operations.len().saturating_sub(retain);
        self.operations.drain(..excess);
        excess
    }
}
