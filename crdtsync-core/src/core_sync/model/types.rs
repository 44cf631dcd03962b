/*
    types.rs - Identifier types shared across the synchronizer

    Replica and CRDT ids are caller-chosen strings. Operation, session and
    resolution ids are generated (UUID v4) and wrapped in newtypes so they
    cannot be mixed up.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a replica (one synchronizer instance)
pub type ReplicaId = String;

/// Identifier of a CRDT instance, unique within a replica's registry
pub type CrdtId = String;

/// Unix timestamp in milliseconds
pub type Millis = u64;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        OperationId(id.into())
    }

    pub fn generate() -> Self {
        OperationId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionId(pub String);

impl ResolutionId {
    pub fn generate() -> Self {
        ResolutionId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ResolutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
