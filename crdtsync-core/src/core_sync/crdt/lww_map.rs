/*
    lww_map.rs - Last-writer-wins map

    Each key holds one register: the value (or a tombstone) written by the
    greatest WriteStamp. Equal timestamps are broken by replica id and then
    operation id. A write older than the current register is dropped and
    reported as ignored.
*/

use super::g_map::{parse_set, SetRequest};
use super::stamp::WriteStamp;
use super::traits::{payload, ApplyOutcome, Crdt};
use crate::core_sync::store::errors::CrdtResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister {
    /// `None` is a tombstone
    pub value: Option<Value>,
    pub stamp: WriteStamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwMap {
    registers: BTreeMap<String, LwwRegister>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum LwwMapOp {
    Set {
        key: String,
        value: Value,
        stamp: WriteStamp,
    },
    Remove {
        key: String,
        stamp: WriteStamp,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LwwMapRequest {
    Set(SetRequest),
    Remove { key: String },
}

impl LwwMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.registers.get(key).and_then(|r| r.value.as_ref())
    }

    pub fn register(&self, key: &str) -> Option<&LwwRegister> {
        self.registers.get(key)
    }

    fn write(&mut self, key: &str, value: Option<&Value>, stamp: &WriteStamp) -> ApplyOutcome {
        match self.registers.get(key) {
            Some(current) if current.stamp == *stamp => ApplyOutcome::unchanged(),
            Some(current) if current.stamp > *stamp => ApplyOutcome::ignored(),
            _ => {
                self.registers.insert(
                    key.to_string(),
                    LwwRegister {
                        value: value.cloned(),
                        stamp: stamp.clone(),
                    },
                );
                ApplyOutcome::changed()
            }
        }
    }
}

impl LwwMapOp {
    pub fn opcode(&self) -> &'static str {
        match self {
            LwwMapOp::Set { .. } => "set",
            LwwMapOp::Remove { .. } => "remove",
        }
    }
}

impl Crdt for LwwMap {
    type Request = LwwMapRequest;
    type Op = LwwMapOp;

    const KIND: &'static str = "lww-map";
    const OPCODES: &'static [&'static str] = &["set", "remove"];

    fn initialize(seed: Option<&Value>, origin: &WriteStamp) -> CrdtResult<Self> {
        let mut map = LwwMap::new();
        for (key, value) in payload::object_seed(seed)? {
            map.write(&key, Some(&value), origin);
        }
        Ok(map)
    }

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<LwwMapRequest> {
        match opcode {
            "set" => Ok(LwwMapRequest::Set(parse_set(payload)?)),
            "remove" => Ok(LwwMapRequest::Remove {
                key: payload::string_field(payload, "key")?,
            }),
            other => Err(payload::unsupported(Self::KIND, other)),
        }
    }

    fn prepare(&self, request: LwwMapRequest, stamp: &WriteStamp) -> CrdtResult<LwwMapOp> {
        Ok(match request {
            LwwMapRequest::Set(SetRequest { key, value }) => LwwMapOp::Set {
                key,
                value,
                stamp: stamp.clone(),
            },
            LwwMapRequest::Remove { key } => LwwMapOp::Remove {
                key,
                stamp: stamp.clone(),
            },
        })
    }

    fn apply(&mut self, op: &LwwMapOp) -> ApplyOutcome {
        match op {
            LwwMapOp::Set { key, value, stamp } => self.write(key, Some(value), stamp),
            LwwMapOp::Remove { key, stamp } => self.write(key, None, stamp),
        }
    }

    fn merge(&mut self, other: &Self) {
        for (key, register) in &other.registers {
            self.write(key, register.value.as_ref(), &register.stamp);
        }
    }

    fn value(&self) -> Value {
        Value::Object(
            self.registers
                .iter()
                .filter_map(|(k, r)| r.value.as_ref().map(|v| (k.clone(), v.clone())))
                .collect(),
        )
    }
}
