/*
    traits.rs - Core CRDT trait

    Every CRDT type in the library issues operations in two steps:
    - prepare: local only, reads the current state to fill in causal context
      (observed write tags, counter totals, sequence anchors) and may reject
    - apply: deterministic, idempotent, and commutative with every other
      prepared operation; remote replay only ever calls apply

    merge is the state-based join. Applying a set of prepared operations in
    any order and joining states must yield identical data.
*/

use super::stamp::WriteStamp;
use crate::core_sync::store::errors::CrdtResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What applying an operation did to the data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Data changed
    pub changed: bool,
    /// The write lost to an existing, newer write
    pub ignored: bool,
}

impl ApplyOutcome {
    pub fn changed() -> Self {
        ApplyOutcome {
            changed: true,
            ignored: false,
        }
    }

    pub fn unchanged() -> Self {
        ApplyOutcome::default()
    }

    pub fn ignored() -> Self {
        ApplyOutcome {
            changed: false,
            ignored: true,
        }
    }

    pub fn from_changed(changed: bool) -> Self {
        ApplyOutcome {
            changed,
            ignored: false,
        }
    }
}

pub trait Crdt: Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync {
    /// Caller intent parsed from an opcode and JSON payload
    type Request;

    /// Prepared operation, self-contained for replay
    type Op: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Kebab-case type tag
    const KIND: &'static str;

    /// Opcodes this type accepts
    const OPCODES: &'static [&'static str];

    /// Build the initial state. `origin` identifies the creating write.
    fn initialize(seed: Option<&Value>, origin: &WriteStamp) -> CrdtResult<Self>;

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<Self::Request>;

    fn prepare(&self, request: Self::Request, stamp: &WriteStamp) -> CrdtResult<Self::Op>;

    fn apply(&mut self, op: &Self::Op) -> ApplyOutcome;

    fn merge(&mut self, other: &Self);

    /// JSON rendering of the visible value
    fn value(&self) -> Value;
}

/// Shared payload helpers for `parse_request` implementations
pub(crate) mod payload {
    use crate::core_sync::store::errors::{CrdtError, CrdtResult};
    use serde_json::Value;

    pub fn unsupported(kind: &str, opcode: &str) -> CrdtError {
        CrdtError::UnsupportedOpcode {
            kind: kind.to_string(),
            opcode: opcode.to_string(),
        }
    }

    pub fn field<'a>(payload: &'a Value, name: &str) -> CrdtResult<&'a Value> {
        payload
            .get(name)
            .ok_or_else(|| CrdtError::InvalidPayload(format!("missing field '{}'", name)))
    }

    pub fn string_field(payload: &Value, name: &str) -> CrdtResult<String> {
        field(payload, name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CrdtError::InvalidPayload(format!("field '{}' must be a string", name)))
    }

    /// Optional non-negative amount, defaulting to 1
    pub fn amount_field(payload: &Value) -> CrdtResult<u64> {
        match payload.get("amount") {
            None | Some(Value::Null) => Ok(1),
            Some(v) => v.as_u64().ok_or_else(|| {
                CrdtError::InvalidPayload("field 'amount' must be a non-negative integer".to_string())
            }),
        }
    }

    pub fn index_field(payload: &Value) -> CrdtResult<Option<usize>> {
        match payload.get("index") {
            None | Some(Value::Null) => Ok(None),
            Some(v) => {
                let index = v.as_u64().ok_or_else(|| {
                    CrdtError::InvalidPayload("field 'index' must be a non-negative integer".to_string())
                })?;
                usize::try_from(index)
                    .map(Some)
                    .map_err(|_| CrdtError::InvalidPayload(format!("index {} is out of range", index)))
            }
        }
    }

    /// Seed given as a JSON array of strings
    pub fn string_array_seed(seed: Option<&Value>) -> CrdtResult<Vec<String>> {
        match seed {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| CrdtError::InvalidSeed(format!("expected string element, got {}", item)))
                })
                .collect(),
            Some(other) => Err(CrdtError::InvalidSeed(format!("expected array, got {}", other))),
        }
    }

    pub fn object_seed(seed: Option<&Value>) -> CrdtResult<serde_json::Map<String, Value>> {
        match seed {
            None | Some(Value::Null) => Ok(serde_json::Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(other) => Err(CrdtError::InvalidSeed(format!("expected object, got {}", other))),
        }
    }
}
