/*
    detector.rs - Concurrency-based conflict detection

    Two operations conflict when neither vector clock dominates the other.
*/

use super::record::ConflictSet;
use crate::core_sync::model::CrdtOperation;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        ConflictDetector
    }

    /// Every stored operation concurrent with `op`
    pub fn detect<'a>(&self, op: &CrdtOperation, history: &'a [CrdtOperation]) -> Vec<&'a CrdtOperation> {
        history
            .iter()
            .filter(|stored| stored.id != op.id && stored.vector_clock.is_concurrent(&op.vector_clock))
            .collect()
    }

    /// Partition operations into conflict sets: per CRDT, the connected
    /// components of the "is concurrent with" relation with two or more members
    pub fn group(&self, operations: &[CrdtOperation]) -> Vec<ConflictSet> {
        let mut by_crdt: BTreeMap<&str, Vec<&CrdtOperation>> = BTreeMap::new();
        for op in operations {
            let group = by_crdt.entry(op.crdt_id.as_str()).or_default();
            if !group.iter().any(|o| o.id == op.id) {
                group.push(op);
            }
        }

        let mut sets = Vec::new();
        for (crdt_id, ops) in by_crdt {
            let mut component = vec![usize::MAX; ops.len()];
            let mut next = 0;
            for start in 0..ops.len() {
                if component[start] != usize::MAX {
                    continue;
                }
                component[start] = next;
                let mut stack = vec![start];
                while let Some(i) = stack.pop() {
                    for j in 0..ops.len() {
                        if component[j] == usize::MAX && ops[i].vector_clock.is_concurrent(&ops[j].vector_clock) {
                            component[j] = next;
                            stack.push(j);
                        }
                    }
                }
                next += 1;
            }

            for c in 0..next {
                let members: Vec<CrdtOperation> = ops
                    .iter()
                    .zip(&component)
                    .filter(|(_, k)| **k == c)
                    .map(|(op, _)| (*op).clone())
                    .collect();
                if members.len() > 1 {
                    sets.push(ConflictSet::new(crdt_id.to_string(), members));
                }
            }
        }
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::conflict::ConflictKind;
    use crate::core_sync::crdt::pn_set::PnSetOp;
    use crate::core_sync::crdt::{CrdtOp, VectorClock};
    use crate::core_sync::model::OperationId;

    fn op(id: &str, crdt: &str, clock: &[(&str, u64)], remove: bool) -> CrdtOperation {
        let element = "x".to_string();
        CrdtOperation {
            id: OperationId::new(id),
            crdt_id: crdt.to_string(),
            replica_id: clock[0].0.to_string(),
            timestamp: 0,
            vector_clock: VectorClock::from_entries(clock.iter().map(|(r, c)| (r.to_string(), *c))),
            dependencies: Vec::new(),
            payload: CrdtOp::PnSet(if remove {
                PnSetOp::Remove { element }
            } else {
                PnSetOp::Add { element }
            }),
        }
    }

    #[test]
    fn test_detect_finds_only_concurrent() {
        let history = vec![
            op("a1", "s", &[("A", 1)], false),
            op("b1", "s", &[("B", 1)], false),
        ];
        let incoming = op("a2", "s", &[("A", 2)], false);

        let found = ConflictDetector::new().detect(&incoming, &history);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "b1");
    }

    #[test]
    fn test_group_builds_components_per_crdt() {
        let ops = vec![
            op("a1", "s", &[("A", 1)], false),
            op("b1", "s", &[("B", 1)], true),
            op("a2", "s", &[("A", 2), ("B", 1)], false),
            op("c1", "t", &[("C", 1)], false),
        ];

        let sets = ConflictDetector::new().group(&ops);

        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].operations.len(), 2);
        assert_eq!(sets[0].kind, ConflictKind::AddRemove);
    }

    #[test]
    fn test_group_without_concurrency_is_empty() {
        let ops = vec![op("a1", "s", &[("A", 1)], false), op("a2", "s", &[("A", 2)], false)];
        assert!(ConflictDetector::new().group(&ops).is_empty());
    }
}
