/*
    pn_counter.rs - Increment/decrement counter

    Two grow-only counters; value is positive total minus negative total.
*/

use super::g_counter::{GCounter, IncrementRequest};
use super::stamp::WriteStamp;
use super::traits::{payload, ApplyOutcome, Crdt};
use crate::core_sync::model::ReplicaId;
use crate::core_sync::store::errors::{CrdtError, CrdtResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnCounter {
    positive: GCounter,
    negative: GCounter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum PnCounterOp {
    Increment {
        replica_id: ReplicaId,
        amount: u64,
        total: u64,
    },
    Decrement {
        replica_id: ReplicaId,
        amount: u64,
        total: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnCounterRequest {
    Increment(IncrementRequest),
    Decrement(IncrementRequest),
}

impl PnCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> i64 {
        let total = self.positive.total() as i128 - self.negative.total() as i128;
        total.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl PnCounterOp {
    pub fn opcode(&self) -> &'static str {
        match self {
            PnCounterOp::Increment { .. } => "increment",
            PnCounterOp::Decrement { .. } => "decrement",
        }
    }
}

impl Crdt for PnCounter {
    type Request = PnCounterRequest;
    type Op = PnCounterOp;

    const KIND: &'static str = "pn-counter";
    const OPCODES: &'static [&'static str] = &["increment", "decrement"];

    fn initialize(seed: Option<&Value>, origin: &WriteStamp) -> CrdtResult<Self> {
        let mut counter = PnCounter::new();
        match seed {
            None | Some(Value::Null) => {}
            Some(v) => {
                let start = v
                    .as_i64()
                    .ok_or_else(|| CrdtError::InvalidSeed(format!("expected integer, got {}", v)))?;
                if start >= 0 {
                    counter.positive.raise(&origin.replica_id, start as u64);
                } else {
                    counter.negative.raise(&origin.replica_id, start.unsigned_abs());
                }
            }
        }
        Ok(counter)
    }

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<PnCounterRequest> {
        let request = IncrementRequest {
            amount: match opcode {
                "increment" | "decrement" => payload::amount_field(payload)?,
                other => return Err(payload::unsupported(Self::KIND, other)),
            },
        };
        Ok(if opcode == "increment" {
            PnCounterRequest::Increment(request)
        } else {
            PnCounterRequest::Decrement(request)
        })
    }

    fn prepare(&self, request: PnCounterRequest, stamp: &WriteStamp) -> CrdtResult<PnCounterOp> {
        let replica_id = stamp.replica_id.clone();
        Ok(match request {
            PnCounterRequest::Increment(IncrementRequest { amount }) => PnCounterOp::Increment {
                total: self.positive.next_total(&replica_id, amount)?,
                replica_id,
                amount,
            },
            PnCounterRequest::Decrement(IncrementRequest { amount }) => PnCounterOp::Decrement {
                total: self.negative.next_total(&replica_id, amount)?,
                replica_id,
                amount,
            },
        })
    }

    fn apply(&mut self, op: &PnCounterOp) -> ApplyOutcome {
        let changed = match op {
            PnCounterOp::Increment { replica_id, total, .. } => self.positive.raise(replica_id, *total),
            PnCounterOp::Decrement { replica_id, total, .. } => self.negative.raise(replica_id, *total),
        };
        ApplyOutcome::from_changed(changed)
    }

    fn merge(&mut self, other: &Self) {
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
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

    fn run(counter: &mut PnCounter, replica: &str, opcode: &str, amount: u64) -> PnCounterOp {
        let stamp = WriteStamp::new(1, replica, OperationId::generate());
        let request = PnCounter::parse_request(opcode, &json!({ "amount": amount })).unwrap();
        let op = counter.prepare(request, &stamp).unwrap();
        counter.apply(&op);
        op
    }

    #[test]
    fn test_value_is_positive_minus_negative() {
        let mut counter = PnCounter::new();
        run(&mut counter, "A", "increment", 10);
        run(&mut counter, "A", "decrement", 4);
        run(&mut counter, "B", "decrement", 9);
        assert_eq!(counter.total(), -3);
        assert_eq!(counter.value(), json!(-3));
    }

    #[test]
    fn test_concurrent_updates_merge() {
        let mut a = PnCounter::new();
        let mut b = PnCounter::new();
        run(&mut a, "A", "increment", 2);
        run(&mut b, "B", "decrement", 5);

        a.merge(&b);
        b.merge(&a);

        assert_eq!(a, b);
        assert_eq!(a.total(), -3);
    }

    #[test]
    fn test_negative_seed_goes_to_negative_side() {
        let stamp = WriteStamp::new(1, "owner", OperationId::new("seed"));
        let counter = PnCounter::initialize(Some(&json!(-4)), &stamp).unwrap();
        assert_eq!(counter.total(), -4);
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(PnCounter::parse_request("reset", &json!({})).is_err());
    }
}
