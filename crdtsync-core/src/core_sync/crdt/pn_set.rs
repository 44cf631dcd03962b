/*
    pn_set.rs - Two-phase (add/remove) set

    Keeps a positive set of added elements and a negative set of removed ones.
    Membership is positive minus negative, so a removed element stays removed
    even if it is added again.
*/

use super::stamp::WriteStamp;
use super::traits::{payload, ApplyOutcome, Crdt};
use crate::core_sync::store::errors::{CrdtError, CrdtResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnSet {
    added: BTreeSet<String>,
    removed: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum PnSetOp {
    Add { element: String },
    Remove { element: String },
}

impl PnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, element: &str) -> bool {
        self.added.contains(element) && !self.removed.contains(element)
    }

    pub fn elements(&self) -> impl Iterator<Item = &String> {
        self.added.difference(&self.removed)
    }

    pub fn is_removed(&self, element: &str) -> bool {
        self.removed.contains(element)
    }
}

impl PnSetOp {
    pub fn opcode(&self) -> &'static str {
        match self {
            PnSetOp::Add { .. } => "add",
            PnSetOp::Remove { .. } => "remove",
        }
    }
}

impl Crdt for PnSet {
    type Request = PnSetOp;
    type Op = PnSetOp;

    const KIND: &'static str = "pn-set";
    const OPCODES: &'static [&'static str] = &["add", "remove"];

    fn initialize(seed: Option<&Value>, _origin: &WriteStamp) -> CrdtResult<Self> {
        Ok(PnSet {
            added: payload::string_array_seed(seed)?.into_iter().collect(),
            removed: BTreeSet::new(),
        })
    }

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<PnSetOp> {
        match opcode {
            "add" => Ok(PnSetOp::Add {
                element: payload::string_field(payload, "element")?,
            }),
            "remove" => Ok(PnSetOp::Remove {
                element: payload::string_field(payload, "element")?,
            }),
            other => Err(payload::unsupported(Self::KIND, other)),
        }
    }

    fn prepare(&self, request: PnSetOp, _stamp: &WriteStamp) -> CrdtResult<PnSetOp> {
        if let PnSetOp::Remove { element } = &request {
            if !self.added.contains(element) {
                return Err(CrdtError::ElementNotPresent(element.clone()));
            }
        }
        Ok(request)
    }

    fn apply(&mut self, op: &PnSetOp) -> ApplyOutcome {
        let changed = match op {
            PnSetOp::Add { element } => self.added.insert(element.clone()),
            PnSetOp::Remove { element } => {
                // Replay may deliver the remove before the add it observed
                let added = self.added.insert(element.clone());
                self.removed.insert(element.clone()) || added
            }
        };
        ApplyOutcome::from_changed(changed)
    }

    fn merge(&mut self, other: &Self) {
        self.added.extend(other.added.iter().cloned());
        self.removed.extend(other.removed.iter().cloned());
    }

    fn value(&self) -> Value {
        Value::Array(self.elements().cloned().map(Value::String).collect())
    }
}
