/*
    g_set.rs - Grow-only set

    Elements can only be added. Merge is set union.
*/

use super::stamp::WriteStamp;
use super::traits::{payload, ApplyOutcome, Crdt};
use crate::core_sync::store::errors::CrdtResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GSet {
    elements: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum GSetOp {
    Add { element: String },
}

impl GSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, element: &str) -> bool {
        self.elements.contains(element)
    }

    pub fn elements(&self) -> impl Iterator<Item = &String> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl GSetOp {
    pub fn opcode(&self) -> &'static str {
        match self {
            GSetOp::Add { .. } => "add",
        }
    }
}

impl Crdt for GSet {
    type Request = GSetOp;
    type Op = GSetOp;

    const KIND: &'static str = "g-set";
    const OPCODES: &'static [&'static str] = &["add"];

    fn initialize(seed: Option<&Value>, _origin: &WriteStamp) -> CrdtResult<Self> {
        Ok(GSet {
            elements: payload::string_array_seed(seed)?.into_iter().collect(),
        })
    }

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<GSetOp> {
        match opcode {
            "add" => Ok(GSetOp::Add {
                element: payload::string_field(payload, "element")?,
            }),
            other => Err(payload::unsupported(Self::KIND, other)),
        }
    }

    fn prepare(&self, request: GSetOp, _stamp: &WriteStamp) -> CrdtResult<GSetOp> {
        Ok(request)
    }

    fn apply(&mut self, op: &GSetOp) -> ApplyOutcome {
        match op {
            GSetOp::Add { element } => ApplyOutcome::from_changed(self.elements.insert(element.clone())),
        }
    }

    fn merge(&mut self, other: &Self) {
        self.elements.extend(other.elements.iter().cloned());
    }

    fn value(&self) -> Value {
        Value::Array(self.elements.iter().cloned().map(Value::String).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::model::OperationId;
    use serde_json::json;

    fn stamp() -> WriteStamp {
        WriteStamp::new(1, "a", OperationId::new("op"))
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut set = GSet::new();
        let op = set
            .prepare(GSet::parse_request("add", &json!({"element": "x"})).unwrap(), &stamp())
            .unwrap();

        assert!(set.apply(&op).changed);
        assert!(!set.apply(&op).changed);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_merge_is_union() {
        let mut a = GSet::initialize(Some(&json!(["x", "y"])), &stamp()).unwrap();
        let b = GSet::initialize(Some(&json!(["y", "z"])), &stamp()).unwrap();

        a.merge(&b);

        assert_eq!(a.value(), json!(["x", "y", "z"]));
    }

    #[test]
    fn test_remove_is_unsupported() {
        let err = GSet::parse_request("remove", &json!({"element": "x"})).unwrap_err();
        assert!(matches!(err, crate::core_sync::CrdtError::UnsupportedOpcode { .. }));
    }

    #[test]
    fn test_seed_must_be_string_array() {
        assert!(GSet::initialize(Some(&json!({"x": 1})), &stamp()).is_err());
        assert!(GSet::initialize(Some(&json!([1, 2])), &stamp()).is_err());
    }
}
