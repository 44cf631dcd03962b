/*
    g_map.rs - Grow-only map

    Keys are never deleted. Per key the write with the greatest WriteStamp
    wins, on local apply, on replay, and on state merge alike.
*/

use super::stamp::WriteStamp;
use super::traits::{payload, ApplyOutcome, Crdt};
use crate::core_sync::store::errors::CrdtResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedValue {
    pub value: Value,
    pub stamp: WriteStamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GMap {
    entries: BTreeMap<String, StampedValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum GMapOp {
    Set {
        key: String,
        value: Value,
        stamp: WriteStamp,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
}

impl GMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write(&mut self, key: &str, value: &Value, stamp: &WriteStamp) -> ApplyOutcome {
        match self.entries.get(key) {
            Some(existing) if existing.stamp == *stamp => ApplyOutcome::unchanged(),
            Some(existing) if existing.stamp > *stamp => ApplyOutcome::ignored(),
            _ => {
                self.entries.insert(
                    key.to_string(),
                    StampedValue {
                        value: value.clone(),
                        stamp: stamp.clone(),
                    },
                );
                ApplyOutcome::changed()
            }
        }
    }
}

impl GMapOp {
    pub fn opcode(&self) -> &'static str {
        "set"
    }
}

pub(crate) fn parse_set(payload: &Value) -> CrdtResult<SetRequest> {
    Ok(SetRequest {
        key: payload::string_field(payload, "key")?,
        value: payload::field(payload, "value")?.clone(),
    })
}

impl Crdt for GMap {
    type Request = SetRequest;
    type Op = GMapOp;

    const KIND: &'static str = "g-map";
    const OPCODES: &'static [&'static str] = &["set"];

    fn initialize(seed: Option<&Value>, origin: &WriteStamp) -> CrdtResult<Self> {
        let mut map = GMap::new();
        for (key, value) in payload::object_seed(seed)? {
            map.write(&key, &value, origin);
        }
        Ok(map)
    }

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<SetRequest> {
        match opcode {
            "set" => parse_set(payload),
            other => Err(payload::unsupported(Self::KIND, other)),
        }
    }

    fn prepare(&self, request: SetRequest, stamp: &WriteStamp) -> CrdtResult<GMapOp> {
        Ok(GMapOp::Set {
            key: request.key,
            value: request.value,
            stamp: stamp.clone(),
        })
    }

    fn apply(&mut self, op: &GMapOp) -> ApplyOutcome {
        match op {
            GMapOp::Set { key, value, stamp } => self.write(key, value, stamp),
        }
    }

    fn merge(&mut self, other: &Self) {
        for (key, entry) in &other.entries {
            self.write(key, &entry.value, &entry.stamp);
        }
    }

    fn value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::model::OperationId;
    use serde_json::json;

    fn set_op(key: &str, value: Value, ts: u64, replica: &str) -> GMapOp {
        GMap::new()
            .prepare(
                SetRequest {
                    key: key.to_string(),
                    value,
                },
                &WriteStamp::new(ts, replica, OperationId::generate()),
            )
            .unwrap()
    }

    #[test]
    fn test_later_write_wins_regardless_of_order() {
        let early = set_op("k", json!(1), 10, "a");
        let late = set_op("k", json!(2), 20, "b");

        let mut forward = GMap::new();
        forward.apply(&early);
        forward.apply(&late);

        let mut backward = GMap::new();
        backward.apply(&late);
        assert!(backward.apply(&early).ignored);

        assert_eq!(forward, backward);
        assert_eq!(forward.get("k"), Some(&json!(2)));
    }

    #[test]
    fn test_remove_unsupported() {
        assert!(GMap::parse_request("remove", &json!({ "key": "k" })).is_err());
    }

    #[test]
    fn test_seed_object() {
        let stamp = WriteStamp::new(1, "a", OperationId::new("seed"));
        let map = GMap::initialize(Some(&json!({ "a": 1, "b": [2] })), &stamp).unwrap();
        assert_eq!(map.value(), json!({ "a": 1, "b": [2] }));
        assert!(GMap::initialize(Some(&json!([1])), &stamp).is_err());
    }
}
