/*
    model - Replicated data model

    Identifiers, operations and per-CRDT state.
*/

pub mod operation;
pub mod state;
pub mod types;

pub use operation::{sort_history, CrdtOperation};
pub use state::CrdtState;
pub use types::{CrdtId, Millis, OperationId, ReplicaId, ResolutionId, SessionId};
