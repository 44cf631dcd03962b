/*
    sequence.rs - Replicated sequence (RGA)

    A replicated growable array. Every element gets an id
    (counter, replica_id) where counter exceeds every counter the issuing
    replica has seen in this sequence, and is anchored after the element that
    was visible just before it (or at the head).

    Ordering: depth-first from the head, children of the same anchor in
    descending id order. A later insert at the same position therefore lands
    right after its anchor, and concurrent inserts at the same position order
    the same way on every replica. Deletes tombstone ids; tombstones are kept
    apart from elements so a delete may arrive before its insert.
*/

use super::stamp::WriteStamp;
use super::traits::{payload, ApplyOutcome, Crdt};
use crate::core_sync::model::ReplicaId;
use crate::core_sync::store::errors::{CrdtError, CrdtResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId {
    pub counter: u64,
    pub replica_id: ReplicaId,
}

impl ElementId {
    pub fn new(counter: u64, replica_id: impl Into<ReplicaId>) -> Self {
        ElementId {
            counter,
            replica_id: replica_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Element {
    value: Value,
    /// `None` anchors at the head
    after: Option<ElementId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    elements: BTreeMap<ElementId, Element>,
    tombstones: BTreeSet<ElementId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum SequenceOp {
    Insert {
        id: ElementId,
        after: Option<ElementId>,
        value: Value,
    },
    Delete {
        id: ElementId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SequenceRequest {
    Insert { index: usize, value: Value },
    DeleteAt { index: usize },
    DeleteValue { value: Value },
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible element ids in order
    pub fn visible_ids(&self) -> Vec<&ElementId> {
        self.ordered()
            .into_iter()
            .filter(|id| !self.tombstones.contains(*id))
            .collect()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.visible_ids()
            .into_iter()
            .filter_map(|id| self.elements.get(id).map(|e| e.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.visible_ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn max_counter(&self) -> u64 {
        self.elements
            .keys()
            .chain(self.tombstones.iter())
            .map(|id| id.counter)
            .max()
            .unwrap_or(0)
    }

    /// All reachable ids, tombstoned or not, in document order.
    /// Elements whose anchor has not arrived yet are left out.
    fn ordered(&self) -> Vec<&ElementId> {
        let mut children: BTreeMap<Option<&ElementId>, Vec<&ElementId>> = BTreeMap::new();
        for (id, element) in &self.elements {
            children.entry(element.after.as_ref()).or_default().push(id);
        }

        let mut result = Vec::with_capacity(self.elements.len());
        // Ids are pushed ascending so that pop yields them descending
        let mut stack: Vec<&ElementId> = children.get(&None).cloned().unwrap_or_default();
        while let Some(id) = stack.pop() {
            result.push(id);
            if let Some(next) = children.get(&Some(id)) {
                stack.extend(next.iter().copied());
            }
        }
        result
    }

    fn insert_element(&mut self, id: &ElementId, after: &Option<ElementId>, value: &Value) -> bool {
        if self.elements.contains_key(id) {
            return false;
        }
        self.elements.insert(
            id.clone(),
            Element {
                value: value.clone(),
                after: after.clone(),
            },
        );
        true
    }
}

impl SequenceOp {
    pub fn opcode(&self) -> &'static str {
        match self {
            SequenceOp::Insert { .. } => "insert",
            SequenceOp::Delete { .. } => "delete",
        }
    }
}

impl Crdt for Sequence {
    type Request = SequenceRequest;
    type Op = SequenceOp;

    const KIND: &'static str = "sequence";
    const OPCODES: &'static [&'static str] = &["insert", "delete"];

    fn initialize(seed: Option<&Value>, origin: &WriteStamp) -> CrdtResult<Self> {
        let items = match seed {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => return Err(CrdtError::InvalidSeed(format!("expected array, got {}", other))),
        };

        let mut sequence = Sequence::new();
        let mut after = None;
        for (i, value) in items.iter().enumerate() {
            let id = ElementId::new(i as u64 + 1, origin.replica_id.clone());
            sequence.insert_element(&id, &after, value);
            after = Some(id);
        }
        Ok(sequence)
    }

    fn parse_request(opcode: &str, payload: &Value) -> CrdtResult<SequenceRequest> {
        match opcode {
            "insert" => Ok(SequenceRequest::Insert {
                index: payload::index_field(payload)?
                    .ok_or_else(|| CrdtError::InvalidPayload("missing field 'index'".to_string()))?,
                value: payload::field(payload, "value")?.clone(),
            }),
            "delete" => match payload::index_field(payload)? {
                Some(index) => Ok(SequenceRequest::DeleteAt { index }),
                None => Ok(SequenceRequest::DeleteValue {
                    value: payload::field(payload, "value")?.clone(),
                }),
            },
            other => Err(payload::unsupported(Self::KIND, other)),
        }
    }

    fn prepare(&self, request: SequenceRequest, stamp: &WriteStamp) -> CrdtResult<SequenceOp> {
        let visible = self.visible_ids();
        match request {
            SequenceRequest::Insert { index, value } => {
                if index > visible.len() {
                    return Err(CrdtError::IndexOutOfBounds {
                        index,
                        len: visible.len(),
                    });
                }
                let after = index.checked_sub(1).map(|i| visible[i].clone());
                Ok(SequenceOp::Insert {
                    id: ElementId::new(self.max_counter() + 1, stamp.replica_id.clone()),
                    after,
                    value,
                })
            }
            SequenceRequest::DeleteAt { index } => visible
                .get(index)
                .map(|id| SequenceOp::Delete { id: (*id).clone() })
                .ok_or(CrdtError::IndexOutOfBounds {
                    index,
                    len: visible.len(),
                }),
            SequenceRequest::DeleteValue { value } => visible
                .into_iter()
                .find(|id| self.elements.get(*id).map(|e| &e.value) == Some(&value))
                .map(|id| SequenceOp::Delete { id: id.clone() })
                .ok_or_else(|| CrdtError::ElementNotPresent(value.to_string())),
        }
    }

    fn apply(&mut self, op: &SequenceOp) -> ApplyOutcome {
        let changed = match op {
            SequenceOp::Insert { id, after, value } => self.insert_element(id, after, value),
            SequenceOp::Delete { id } => self.tombstones.insert(id.clone()),
        };
        ApplyOutcome::from_changed(changed)
    }

    fn merge(&mut self, other: &Self) {
        for (id, element) in &other.elements {
            self.insert_element(id, &element.after, &element.value);
        }
        self.tombstones.extend(other.tombstones.iter().cloned());
    }

    fn value(&self) -> Value {
        Value::Array(self.to_vec())
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

    fn run(seq: &mut Sequence, replica: &str, opcode: &str, payload: Value) -> CrdtResult<SequenceOp> {
        let op = seq.prepare(Sequence::parse_request(opcode, &payload)?, &stamp(replica))?;
        seq.apply(&op);
        Ok(op)
    }

    #[test]
    fn test_insert_by_index() {
        let mut seq = Sequence::new();
        run(&mut seq, "A", "insert", json!({"index": 0, "value": "b"})).unwrap();
        run(&mut seq, "A", "insert", json!({"index": 0, "value": "a"})).unwrap();
        run(&mut seq, "A", "insert", json!({"index": 2, "value": "c"})).unwrap();
        run(&mut seq, "A", "insert", json!({"index": 1, "value": "ab"})).unwrap();
        assert_eq!(seq.value(), json!(["a", "ab", "b", "c"]));
    }

    #[test]
    fn test_insert_past_end_rejected() {
        let mut seq = Sequence::new();
        let err = run(&mut seq, "A", "insert", json!({"index": 1, "value": "x"})).unwrap_err();
        assert_eq!(err, CrdtError::IndexOutOfBounds { index: 1, len: 0 });
    }

    #[test]
    fn test_delete_by_value_and_index() {
        let stamp = stamp("A");
        let mut seq = Sequence::initialize(Some(&json!(["a", "b", "c"])), &stamp).unwrap();
        run(&mut seq, "A", "delete", json!({"value": "b"})).unwrap();
        run(&mut seq, "A", "delete", json!({"index": 0})).unwrap();
        assert_eq!(seq.value(), json!(["c"]));

        assert!(matches!(
            run(&mut seq, "A", "delete", json!({"value": "zzz"})),
            Err(CrdtError::ElementNotPresent(_))
        ));
        assert!(matches!(
            run(&mut seq, "A", "delete", json!({"index": 1})),
            Err(CrdtError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_concurrent_inserts_same_position_converge() {
        let base = Sequence::initialize(Some(&json!(["x"])), &stamp("A")).unwrap();
        let mut a = base.clone();
        let mut b = base.clone();

        let from_a = run(&mut a, "A", "insert", json!({"index": 1, "value": "from-a"})).unwrap();
        let from_b = run(&mut b, "B", "insert", json!({"index": 1, "value": "from-b"})).unwrap();

        a.apply(&from_b);
        b.apply(&from_a);

        assert_eq!(a, b);
        // Same counter, so the greater replica id comes first
        assert_eq!(a.value(), json!(["x", "from-b", "from-a"]));
    }

    #[test]
    fn test_delete_before_insert_commutes() {
        let mut origin = Sequence::new();
        let insert = run(&mut origin, "A", "insert", json!({"index": 0, "value": "v"})).unwrap();
        let delete = run(&mut origin, "A", "delete", json!({"index": 0})).unwrap();

        let mut late = Sequence::new();
        late.apply(&delete);
        late.apply(&insert);

        assert_eq!(late, origin);
        assert!(late.is_empty());
    }

    #[test]
    fn test_orphan_hidden_until_anchor_arrives() {
        let mut origin = Sequence::new();
        let first = run(&mut origin, "A", "insert", json!({"index": 0, "value": 1})).unwrap();
        let second = run(&mut origin, "A", "insert", json!({"index": 1, "value": 2})).unwrap();

        let mut replica = Sequence::new();
        replica.apply(&second);
        assert!(replica.is_empty());
        replica.apply(&first);
        assert_eq!(replica.value(), json!([1, 2]));
    }
}
