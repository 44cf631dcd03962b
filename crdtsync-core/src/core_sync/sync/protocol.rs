/*
    protocol.rs - Push-pull sync messages

    The initiator pushes delta states for everything the target may lack and
    its own digest; the responder merges, then answers with the deltas the
    initiator lacks according to that digest.
*/

use crate::core_sync::crdt::VectorClock;
use crate::core_sync::model::{CrdtId, CrdtState, ReplicaId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CRDT id -> object clock
pub type Digest = BTreeMap<CrdtId, VectorClock>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub session_id: SessionId,
    pub origin: ReplicaId,
    pub clock: VectorClock,
    pub digest: Digest,
    pub states: Vec<CrdtState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub responder: ReplicaId,
    pub clock: VectorClock,
    /// Responder digest after merging the request
    pub digest: Digest,
    pub states: Vec<CrdtState>,
    /// Operations the responder replayed from the request
    pub operations_applied: usize,
    pub conflicts_resolved: usize,
    /// Total history length at the responder
    pub operation_count: usize,
}

impl SyncRequest {
    pub fn operation_count(&self) -> usize {
        self.states.iter().map(|s| s.operations.len()).sum()
    }
}

impl SyncResponse {
    pub fn shipped_operations(&self) -> usize {
        self.states.iter().map(|s| s.operations.len()).sum()
    }
}
