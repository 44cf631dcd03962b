/*
    operation.rs - A replicated CRDT operation

    Immutable once created. Carries everything a peer needs to replay it:
    the prepared payload, the issuing replica, wall-clock timestamp, the
    object clock snapshot at issue time and the ids of the history heads it
    was issued on top of.
*/

use super::types::{CrdtId, Millis, OperationId, ReplicaId};
use crate::core_sync::crdt::{CrdtOp, VectorClock, WriteStamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdtOperation {
    pub id: OperationId,
    pub crdt_id: CrdtId,
    pub replica_id: ReplicaId,
    pub timestamp: Millis,
    pub vector_clock: VectorClock,
    #[serde(default)]
    pub dependencies: Vec<OperationId>,
    pub payload: CrdtOp,
}

impl CrdtOperation {
    pub fn opcode(&self) -> &'static str {
        self.payload.opcode()
    }

    pub fn stamp(&self) -> WriteStamp {
        WriteStamp::new(self.timestamp, self.replica_id.clone(), self.id.clone())
    }

    /// Linear extension of causal order, stable across replicas
    pub fn order_key(&self) -> (u64, WriteStamp) {
        (self.vector_clock.sum(), self.stamp())
    }

    /// Whether `clock` already accounts for this operation
    pub fn is_covered_by(&self, clock: &VectorClock) -> bool {
        clock.get(&self.replica_id) >= self.vector_clock.get(&self.replica_id)
    }
}

/// Sort operations into their canonical history order
pub fn sort_history(ops: &mut [CrdtOperation]) {
    ops.sort_by_cached_key(CrdtOperation::order_key);
}
