/*
    or_map.rs - Observed-remove map

    Every write to a key is tagged with its WriteStamp. A set supersedes the
    tags it observed; a remove tombstones exactly the tags it observed, so a
    concurrent set that the remover never saw survives. When several live
    writes remain (concurrent sets), the visible value is the one with the
    greatest tag.
*/

use super::g_map::{parse_set, SetRequest};
use super::stamp::WriteStamp;
use super::traits::{payload, ApplyOutcome, Crdt};
use crate::core_sync::store::errors::{CrdtError, CrdtResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct OrEntry {
    /// Live writes by tag
    writes: BTreeMap<WriteStamp, Value>,
    /// Tags that were observed by a later set or remove
    tombstones: BTreeSet<WriteStamp>,
}

impl OrEntry {
    fn visible(&self) -> Option<&Value> {
        self.writes.iter().next_back().map(|(_, v)| v)
    }

    fn bury(&mut self, tags: &BTreeSet<WriteStamp>) -> bool {
        let mut changed = false;
        for tag in tags {
            changed |= self.tombstones.insert(tag.clone());
            changed |= self.writes.remove(tag).is_some();
        }
        changed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrMap {
    entries: BTreeMap<String, OrEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum OrMapOp {
    Set {
        key: String,
        value: Value,
        tag: WriteStamp,
        replaces: BTreeSet<WriteStamp>,
    },
    Remove {
        key: String,
        observed: BTreeSet<WriteStamp>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrMapRequest {
    Set(SetRequest),
    Remove { key: String },
}

impl OrMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).and_then(OrEntry::visible)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of live writes for a key; more than one means concurrent sets
    pub fn live_writes(&self, key: &str) -> usize {
        self.entries.get(key).map(|e| e.writes.len()).unwrap_or(0)
    }

    fn observed_tags(&self, key: &str) -> BTreeSet<WriteStamp> {
        self.entries
            .get(key)
            .map(|e| e.writes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn insert_write(&mut self, key: &str, value: &Value, tag: &WriteStamp) -> bool {
        let entry = self.entries.entry(key.to_string()).or_default();
        if entry.tombstones.contains(tag) || entry.writes.contains_key(tag) {
            return false;
        }
        entry.writes.insert(tag.clone(), value.clone());
        true
    }
}

impl OrMapOp {
    pub fn opcode(&self) -> &'static str {
        match self {
            OrMapOp::Set { .. } => "set",
            OrMapOp::Remove { .. } => "remove",
        }
    }
}

impl Crdt for OrMap {
    type Request = OrMapRequest;
    type Op = OrMapOp;

    const KIND: &'static str = "or-map";
    const OPCODES: &'static [&'static str] = &["set", "remove"];

    fn initialize(seed: Option<&Value>, origin: &WriteStamp) -> CrdtResult<Self> {
        let mut map = OrMap::new();
        for (key, value) in payload::object_seed(seed)? {
            map.insert_write(&key, &value, origin);
        }
        Ok(map)
    }

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<OrMapRequest> {
        match opcode {
            "set" => Ok(OrMapRequest::Set(parse_set(payload)?)),
            "remove" => Ok(OrMapRequest::Remove {
                key: payload::string_field(payload, "key")?,
            }),
            other => Err(payload::unsupported(Self::KIND, other)),
        }
    }

    fn prepare(&self, request: OrMapRequest, stamp: &WriteStamp) -> CrdtResult<OrMapOp> {
        match request {
            OrMapRequest::Set(SetRequest { key, value }) => Ok(OrMapOp::Set {
                replaces: self.observed_tags(&key),
                key,
                value,
                tag: stamp.clone(),
            }),
            OrMapRequest::Remove { key } => {
                let observed = self.observed_tags(&key);
                if observed.is_empty() {
                    return Err(CrdtError::ElementNotPresent(key));
                }
                Ok(OrMapOp::Remove { key, observed })
            }
        }
    }

    fn apply(&mut self, op: &OrMapOp) -> ApplyOutcome {
        let changed = match op {
            OrMapOp::Set {
                key,
                value,
                tag,
                replaces,
            } => {
                let buried = self.entries.entry(key.clone()).or_default().bury(replaces);
                self.insert_write(key, value, tag) || buried
            }
            OrMapOp::Remove { key, observed } => {
                if observed.is_empty() {
                    false
                } else {
                    self.entries.entry(key.clone()).or_default().bury(observed)
                }
            }
        };
        ApplyOutcome::from_changed(changed)
    }

    fn merge(&mut self, other: &Self) {
        for (key, theirs) in &other.entries {
            let entry = self.entries.entry(key.clone()).or_default();
            entry.tombstones.extend(theirs.tombstones.iter().cloned());
            for (tag, value) in &theirs.writes {
                entry.writes.entry(tag.clone()).or_insert_with(|| value.clone());
            }
            let tombstones = &entry.tombstones;
            entry.writes.retain(|tag, _| !tombstones.contains(tag));
        }
    }

    fn value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .filter_map(|(k, e)| e.visible().map(|v| (k.clone(), v.clone())))
                .collect(),
        )
    }
}
