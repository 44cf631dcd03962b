/*
    record.rs - Conflict sets and the resolution audit record
*/

use crate::core_sync::model::{CrdtId, CrdtOperation, Millis, OperationId, ResolutionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Concurrent writes of the same flavour
    ConcurrentWrite,
    /// A removal concurrent with an addition
    AddRemove,
}

/// Mutually concurrent operations on one CRDT
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictSet {
    pub crdt_id: CrdtId,
    pub kind: ConflictKind,
    pub operations: Vec<CrdtOperation>,
}

impl ConflictSet {
    pub fn new(crdt_id: CrdtId, operations: Vec<CrdtOperation>) -> Self {
        let removals = operations.iter().filter(|op| op.payload.is_removal()).count();
        let kind = if removals > 0 && removals < operations.len() {
            ConflictKind::AddRemove
        } else {
            ConflictKind::ConcurrentWrite
        };
        ConflictSet {
            crdt_id,
            kind,
            operations,
        }
    }
}

/// Append-only audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub id: ResolutionId,
    pub kind: ConflictKind,
    pub crdt_id: CrdtId,
    pub operations: Vec<CrdtOperation>,
    /// Strategy output
    pub resolution: Value,
    pub winner: Option<OperationId>,
    pub strategy: String,
    /// Raised during a merge rather than by an explicit request
    pub automatic: bool,
    pub timestamp: Millis,
}

impl ConflictResolution {
    pub fn summary(&self) -> String {
        match &self.winner {
            Some(winner) => format!(
                "{} on {}: {} ops, winner {} via {}",
                kind_name(self.kind),
                self.crdt_id,
                self.operations.len(),
                winner,
                self.strategy
            ),
            None => format!(
                "{} on {}: {} ops merged via {}",
                kind_name(self.kind),
                self.crdt_id,
                self.operations.len(),
                self.strategy
            ),
        }
    }
}

fn kind_name(kind: ConflictKind) -> &'static str {
    match kind {
        ConflictKind::ConcurrentWrite => "concurrent-write",
        ConflictKind::AddRemove => "add-remove",
    }
}
