/*
    g_counter.rs - Grow-only counter

    One component per replica. A prepared increment carries the issuing
    replica's new component total, so applying it is a max and replaying it
    twice changes nothing. Value is the sum of all components.
*/

use super::stamp::WriteStamp;
use super::traits::{payload, ApplyOutcome, Crdt};
use crate::core_sync::model::ReplicaId;
use crate::core_sync::store::errors::{CrdtError, CrdtResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    counts: BTreeMap<ReplicaId, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum GCounterOp {
    Increment {
        replica_id: ReplicaId,
        amount: u64,
        total: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementRequest {
    pub amount: u64,
}

impl GCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, c| acc.saturating_add(*c))
    }

    pub fn component(&self, replica_id: &str) -> u64 {
        self.counts.get(replica_id).copied().unwrap_or(0)
    }

    /// New component total for `replica_id` after adding `amount`
    pub(crate) fn next_total(&self, replica_id: &str, amount: u64) -> CrdtResult<u64> {
        self.component(replica_id)
            .checked_add(amount)
            .ok_or_else(|| CrdtError::InvalidPayload("counter overflow".to_string()))
    }

    /// Raise a component to at least `total`
    pub(crate) fn raise(&mut self, replica_id: &str, total: u64) -> bool {
        if total <= self.component(replica_id) {
            return false;
        }
        self.counts.insert(replica_id.to_string(), total);
        true
    }
}

impl GCounterOp {
    pub fn opcode(&self) -> &'static str {
        "increment"
    }
}

impl Crdt for GCounter {
    type Request = IncrementRequest;
    type Op = GCounterOp;

    const KIND: &'static str = "g-counter";
    const OPCODES: &'static [&'static str] = &["increment"];

    fn initialize(seed: Option<&Value>, origin: &WriteStamp) -> CrdtResult<Self> {
        let mut counter = GCounter::new();
        match seed {
            None | Some(Value::Null) => {}
            Some(v) => {
                let start = v
                    .as_u64()
                    .ok_or_else(|| CrdtError::InvalidSeed(format!("expected non-negative integer, got {}", v)))?;
                counter.raise(&origin.replica_id, start);
            }
        }
        Ok(counter)
    }

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<IncrementRequest> {
        match opcode {
            "increment" => Ok(IncrementRequest {
                amount: payload::amount_field(payload)?,
            }),
            other => Err(payload::unsupported(Self::KIND, other)),
        }
    }

    fn prepare(&self, request: IncrementRequest, stamp: &WriteStamp) -> CrdtResult<GCounterOp> {
        Ok(GCounterOp::Increment {
            replica_id: stamp.replica_id.clone(),
            amount: request.amount,
            total: self.next_total(&stamp.replica_id, request.amount)?,
        })
    }

    fn apply(&mut self, op: &GCounterOp) -> ApplyOutcome {
        match op {
            GCounterOp::Increment { replica_id, total, .. } => {
                ApplyOutcome::from_changed(self.raise(replica_id, *total))
            }
        }
    }

    fn merge(&mut self, other: &Self) {
        for (replica_id, &count) in &other.counts {
            self.raise(replica_id, count);
        }
    }

    fn value(&self) -> Value {
        Value::from(self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::model::OperationId;
    use serde_json::json;

    fn stamp(replica: &str) -> WriteStamp {
        WriteStamp::new(1, replica, OperationId::generate())
    }

    fn increment(counter: &mut GCounter, replica: &str, amount: u64) -> GCounterOp {
        let op = counter
            .prepare(
                GCounter::parse_request("increment", &json!({ "amount": amount })).unwrap(),
                &stamp(replica),
            )
            .unwrap();
        counter.apply(&op);
        op
    }

    #[test]
    fn test_increments_from_two_replicas_sum() {
        let mut a = GCounter::new();
        let mut b = GCounter::new();
        increment(&mut a, "A", 3);
        increment(&mut b, "B", 5);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert_eq!(ab.total(), 8);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_replayed_increment_is_idempotent() {
        let mut counter = GCounter::new();
        let op = increment(&mut counter, "A", 2);
        assert!(!counter.apply(&op).changed);
        assert_eq!(counter.total(), 2);
    }

    #[test]
    fn test_amount_defaults_to_one() {
        assert_eq!(
            GCounter::parse_request("increment", &json!({})).unwrap(),
            IncrementRequest { amount: 1 }
        );
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(GCounter::parse_request("increment", &json!({ "amount": -1 })).is_err());
    }

    #[test]
    fn test_seed_credits_owner() {
        let counter = GCounter::initialize(Some(&json!(7)), &stamp("owner")).unwrap();
        assert_eq!(counter.component("owner"), 7);
        assert!(GCounter::initialize(Some(&json!(-1)), &stamp("owner")).is_err());
    }
}
