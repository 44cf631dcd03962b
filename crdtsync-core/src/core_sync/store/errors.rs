/*
    errors.rs - Error types for the synchronizer

    Two layers:
    - CrdtError: failures inside the CRDT type library (bad payloads, seeds,
      preconditions such as removing an element that was never added)
    - SyncError: the caller-visible taxonomy of the synchronizer facade,
      storage and transport
*/

use thiserror::Error;

/// Failures raised by the CRDT type library
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrdtError {
    /// Opcode is not one of the type's operations
    #[error("Unsupported operation '{opcode}' for {kind}")]
    UnsupportedOpcode { kind: String, opcode: String },

    /// Remove/delete of something that is not there
    #[error("Element not present: {0}")]
    ElementNotPresent(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// An operation or state of one CRDT type was handed to another
    #[error("Kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: String, actual: String },
}

pub type CrdtResult<T> = Result<T, CrdtError>;

/// Errors surfaced by the synchronizer
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("CRDT not found: {0}")]
    NotFound(String),

    #[error("CRDT already exists: {0}")]
    AlreadyExists(String),

    #[error("Unsupported operation '{opcode}' for {kind}")]
    UnsupportedOperation { kind: String, opcode: String },

    #[error("Unknown conflict resolution strategy: {0}")]
    UnknownStrategy(String),

    #[error("Replica unavailable: {replica}: {reason}")]
    ReplicaUnavailable { replica: String, reason: String },

    #[error("CRDT error: {0}")]
    Crdt(CrdtError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn unavailable(replica: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::ReplicaUnavailable {
            replica: replica.into(),
            reason: reason.into(),
        }
    }

    /// Errors that leave the synchronizer untouched and are the caller's to fix
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound(_)
                | SyncError::AlreadyExists(_)
                | SyncError::UnsupportedOperation { .. }
                | SyncError::Crdt(_)
        )
    }
}

impl From<CrdtError> for SyncError {
    fn from(err: CrdtError) -> Self {
        match err {
            CrdtError::UnsupportedOpcode { kind, opcode } => {
                SyncError::UnsupportedOperation { kind, opcode }
            }
            other => SyncError::Crdt(other),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}
