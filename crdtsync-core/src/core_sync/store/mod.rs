/*
    store - Persistence and error types

    Key-value store collaborator (in-memory and file backed), replica
    snapshots, the outbound propagation buffer and the error taxonomy.
*/

pub mod errors;
pub mod file_store;
pub mod kv;
pub mod propagation;
pub mod snapshot;

pub use errors::{CrdtError, CrdtResult, SyncError, SyncResult};
pub use file_store::FileStore;
pub use kv::{KeyValueStore, MemoryStore};
pub use propagation::{PropagationBuffer, PropagationEntry};
pub use snapshot::{RegistrySnapshot, ReplicaSnapshot, SnapshotMetadata};
