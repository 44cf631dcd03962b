/*
    stamp.rs - Deterministic write ordering

    A WriteStamp orders writes by wall-clock timestamp, then replica id, then
    operation id. Every replica compares stamps the same way, so maps that keep
    "the latest write per key" converge even on equal timestamps.
*/

use crate::core_sync::model::{Millis, OperationId, ReplicaId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WriteStamp {
    pub timestamp: Millis,
    pub replica_id: ReplicaId,
    pub operation_id: OperationId,
}

impl WriteStamp {
    pub fn new(timestamp: Millis, replica_id: impl Into<ReplicaId>, operation_id: OperationId) -> Self {
        WriteStamp {
            timestamp,
            replica_id: replica_id.into(),
            operation_id,
        }
    }
}

impl fmt::Display for WriteStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.timestamp, self.replica_id, self.operation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_dominates_ordering() {
        let early = WriteStamp::new(100, "z", OperationId::new("z"));
        let late = WriteStamp::new(200, "a", OperationId::new("a"));
        assert!(late > early);
    }

    #[test]
    fn test_equal_timestamps_break_on_replica_then_operation() {
        let a = WriteStamp::new(100, "replica-a", OperationId::new("2"));
        let b = WriteStamp::new(100, "replica-b", OperationId::new("1"));
        assert!(b > a);

        let b2 = WriteStamp::new(100, "replica-b", OperationId::new("2"));
        assert!(b2 > b);
    }
}
