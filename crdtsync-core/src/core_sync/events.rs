//! Synchronizer events
//!
//! Emitted after state changes for observers (agents, UIs, metrics bridges).
//! Each event maps to a topic string, a JSON payload and a priority.

use crate::core_sync::crdt::CrdtKind;
use crate::core_sync::model::{CrdtId, Millis, OperationId, ReplicaId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

pub const TOPIC_CREATED: &str = "crdt:created";
pub const TOPIC_UPDATED: &str = "crdt:updated";
pub const TOPIC_MERGED: &str = "crdt:merged";
pub const TOPIC_SYNC_COMPLETED: &str = "crdt:sync-completed";
pub const TOPIC_CONFLICTS_RESOLVED: &str = "crdt:conflicts-resolved";
pub const TOPIC_COMPACTED: &str = "crdt:compacted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyncEvent {
    Created {
        crdt_id: CrdtId,
        kind: CrdtKind,
        replica_id: ReplicaId,
        version: u64,
    },

    Updated {
        crdt_id: CrdtId,
        operation_id: OperationId,
        opcode: String,
        version: u64,
    },

    /// Remote state merged into a local CRDT (or adopted when absent)
    Merged {
        crdt_id: CrdtId,
        operations_applied: usize,
        version: u64,
        adopted: bool,
    },

    SyncCompleted {
        session_id: SessionId,
        replicas_synced: usize,
        failed_replicas: Vec<ReplicaId>,
        operations_synced: usize,
        conflicts_resolved: usize,
        duration_ms: Millis,
    },

    ConflictsResolved {
        crdt_ids: Vec<CrdtId>,
        count: usize,
        strategy: String,
        automatic: bool,
    },

    Compacted {
        operations_compacted: usize,
    },
}

impl SyncEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            SyncEvent::Created { .. } => TOPIC_CREATED,
            SyncEvent::Updated { .. } => TOPIC_UPDATED,
            SyncEvent::Merged { .. } => TOPIC_MERGED,
            SyncEvent::SyncCompleted { .. } => TOPIC_SYNC_COMPLETED,
            SyncEvent::ConflictsResolved { .. } => TOPIC_CONFLICTS_RESOLVED,
            SyncEvent::Compacted { .. } => TOPIC_COMPACTED,
        }
    }

    pub fn priority(&self) -> EventPriority {
        match self {
            SyncEvent::Updated { .. } | SyncEvent::Compacted { .. } => EventPriority::Low,
            SyncEvent::Created { .. } | SyncEvent::Merged { .. } => EventPriority::Normal,
            SyncEvent::SyncCompleted { failed_replicas, .. } => {
                if failed_replicas.is_empty() {
                    EventPriority::Normal
                } else {
                    EventPriority::High
                }
            }
            SyncEvent::ConflictsResolved { .. } => EventPriority::High,
        }
    }

    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Receives synchronizer events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

/// Logs events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: SyncEvent) {
        let topic = event.topic();
        match event.priority() {
            EventPriority::Low => trace!(topic, payload = %event.payload(), "event"),
            EventPriority::Normal => debug!(topic, payload = %event.payload(), "event"),
            EventPriority::High => info!(topic, payload = %event.payload(), "event"),
            EventPriority::Critical => warn!(topic, payload = %event.payload(), "event"),
        }
    }
}

/// Fans events out over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<SyncEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: SyncEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}
