/*
    core_sync - Replica-local CRDT synchronization

    Maintains CRDT instances for one replica and converges them with peers.
    Handles:
    - CRDT type library and vector-clock causality
    - Operation history, propagation buffer and compaction
    - Conflict detection and resolution audit
    - Replica registry, sync sessions and push-pull exchange
    - Snapshots, events and the command surface
*/

pub mod commands;
pub mod conflict;
pub mod crdt;
pub mod events;
pub mod model;
pub mod store;
pub mod sync;
pub mod synchronizer;

#[cfg(test)]
pub mod tests;

// Re-export commonly used types
pub use commands::{CommandResponse, SyncCommand};
pub use crdt::{CrdtData, CrdtKind, CrdtOp, VectorClock};
pub use events::{BroadcastEventSink, EventPriority, EventSink, SyncEvent, TracingEventSink};
pub use model::{CrdtId, CrdtOperation, CrdtState, OperationId, ReplicaId};
pub use store::{CrdtError, CrdtResult, FileStore, KeyValueStore, MemoryStore, SyncError, SyncResult};
pub use sync::{InMemoryNetwork, ReplicaTransport, SharedSynchronizer, StoreBackedTransport, SyncDriver};
pub use synchronizer::{ApplyResult, CreateResult, CrdtSynchronizer, MergeResult, ResolveResult, SyncStats};
