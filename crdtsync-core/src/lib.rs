//! crdtsync-core
//!
//! A replica-local CRDT synchronizer: eight CRDT types, vector-clock causality
//! tracking, conflict detection and resolution, and a push-pull sync protocol
//! between peer replicas.

pub mod clock;
pub mod config;
pub mod core_sync;
pub mod logging;
pub mod metrics;
pub mod shutdown;

#[cfg(test)]
pub mod test_utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, SyncConfig};
pub use core_sync::{
    CrdtKind, CrdtOp, CrdtState, CrdtSynchronizer, SyncCommand, SyncError, SyncResult,
    VectorClock,
};
pub use logging::{init_logging, LogLevel};
