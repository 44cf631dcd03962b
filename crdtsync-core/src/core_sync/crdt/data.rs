/*
    data.rs - Type-tag dispatch over the CRDT library

    CrdtKind names the eight types, CrdtData holds one instance of any of
    them and CrdtOp is the tagged union of their prepared operations. The
    synchronizer only ever talks to these three.
*/

use super::g_counter::{GCounter, GCounterOp};
use super::g_map::{GMap, GMapOp};
use super::g_set::{GSet, GSetOp};
use super::lww_map::{LwwMap, LwwMapOp};
use super::or_map::{OrMap, OrMapOp};
use super::pn_counter::{PnCounter, PnCounterOp};
use super::pn_set::{PnSet, PnSetOp};
use super::sequence::{Sequence, SequenceOp};
use super::stamp::WriteStamp;
use super::traits::{ApplyOutcome, Crdt};
use crate::core_sync::store::errors::{CrdtError, CrdtResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrdtKind {
    GSet,
    PnSet,
    GCounter,
    PnCounter,
    GMap,
    OrMap,
    LwwMap,
    Sequence,
}

impl CrdtKind {
    pub const ALL: [CrdtKind; 8] = [
        CrdtKind::GSet,
        CrdtKind::PnSet,
        CrdtKind::GCounter,
        CrdtKind::PnCounter,
        CrdtKind::GMap,
        CrdtKind::OrMap,
        CrdtKind::LwwMap,
        CrdtKind::Sequence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrdtKind::GSet => GSet::KIND,
            CrdtKind::PnSet => PnSet::KIND,
            CrdtKind::GCounter => GCounter::KIND,
            CrdtKind::PnCounter => PnCounter::KIND,
            CrdtKind::GMap => GMap::KIND,
            CrdtKind::OrMap => OrMap::KIND,
            CrdtKind::LwwMap => LwwMap::KIND,
            CrdtKind::Sequence => Sequence::KIND,
        }
    }

    pub fn opcodes(&self) -> &'static [&'static str] {
        match self {
            CrdtKind::GSet => GSet::OPCODES,
            CrdtKind::PnSet => PnSet::OPCODES,
            CrdtKind::GCounter => GCounter::OPCODES,
            CrdtKind::PnCounter => PnCounter::OPCODES,
            CrdtKind::GMap => GMap::OPCODES,
            CrdtKind::OrMap => OrMap::OPCODES,
            CrdtKind::LwwMap => LwwMap::OPCODES,
            CrdtKind::Sequence => Sequence::OPCODES,
        }
    }

    /// Accepts kebab-case, snake_case and the usual short spellings
    pub fn parse(s: &str) -> Option<CrdtKind> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let kind = match normalized.as_str() {
            "g-set" | "gset" => CrdtKind::GSet,
            "pn-set" | "pnset" | "2p-set" => CrdtKind::PnSet,
            "g-counter" | "gcounter" => CrdtKind::GCounter,
            "pn-counter" | "pncounter" => CrdtKind::PnCounter,
            "g-map" | "gmap" => CrdtKind::GMap,
            "or-map" | "ormap" => CrdtKind::OrMap,
            "lww-map" | "lwwmap" => CrdtKind::LwwMap,
            "sequence" | "seq" | "rga" => CrdtKind::Sequence,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for CrdtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrdtKind {
    type Err = CrdtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrdtKind::parse(s).ok_or_else(|| CrdtError::InvalidPayload(format!("unknown CRDT type '{}'", s)))
    }
}

/// One CRDT instance of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "kebab-case")]
pub enum CrdtData {
    GSet(GSet),
    PnSet(PnSet),
    GCounter(GCounter),
    PnCounter(PnCounter),
    GMap(GMap),
    OrMap(OrMap),
    LwwMap(LwwMap),
    Sequence(Sequence),
}

/// Prepared operation of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "op", rename_all = "kebab-case")]
pub enum CrdtOp {
    GSet(GSetOp),
    PnSet(PnSetOp),
    GCounter(GCounterOp),
    PnCounter(PnCounterOp),
    GMap(GMapOp),
    OrMap(OrMapOp),
    LwwMap(LwwMapOp),
    Sequence(SequenceOp),
}

impl CrdtOp {
    pub fn kind(&self) -> CrdtKind {
        match self {
            CrdtOp::GSet(_) => CrdtKind::GSet,
            CrdtOp::PnSet(_) => CrdtKind::PnSet,
            CrdtOp::GCounter(_) => CrdtKind::GCounter,
            CrdtOp::PnCounter(_) => CrdtKind::PnCounter,
            CrdtOp::GMap(_) => CrdtKind::GMap,
            CrdtOp::OrMap(_) => CrdtKind::OrMap,
            CrdtOp::LwwMap(_) => CrdtKind::LwwMap,
            CrdtOp::Sequence(_) => CrdtKind::Sequence,
        }
    }

    pub fn opcode(&self) -> &'static str {
        match self {
            CrdtOp::GSet(op) => op.opcode(),
            CrdtOp::PnSet(op) => op.opcode(),
            CrdtOp::GCounter(op) => op.opcode(),
            CrdtOp::PnCounter(op) => op.opcode(),
            CrdtOp::GMap(op) => op.opcode(),
            CrdtOp::OrMap(op) => op.opcode(),
            CrdtOp::LwwMap(op) => op.opcode(),
            CrdtOp::Sequence(op) => op.opcode(),
        }
    }

    /// Removal-type operations (remove, delete, decrement)
    pub fn is_removal(&self) -> bool {
        matches!(self.opcode(), "remove" | "delete" | "decrement")
    }
}

fn mismatch(expected: CrdtKind, actual: CrdtKind) -> CrdtError {
    CrdtError::KindMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

impl CrdtData {
    pub fn initialize(kind: CrdtKind, seed: Option<&Value>, origin: &WriteStamp) -> CrdtResult<Self> {
        Ok(match kind {
            CrdtKind::GSet => CrdtData::GSet(GSet::initialize(seed, origin)?),
            CrdtKind::PnSet => CrdtData::PnSet(PnSet::initialize(seed, origin)?),
            CrdtKind::GCounter => CrdtData::GCounter(GCounter::initialize(seed, origin)?),
            CrdtKind::PnCounter => CrdtData::PnCounter(PnCounter::initialize(seed, origin)?),
            CrdtKind::GMap => CrdtData::GMap(GMap::initialize(seed, origin)?),
            CrdtKind::OrMap => CrdtData::OrMap(OrMap::initialize(seed, origin)?),
            CrdtKind::LwwMap => CrdtData::LwwMap(LwwMap::initialize(seed, origin)?),
            CrdtKind::Sequence => CrdtData::Sequence(Sequence::initialize(seed, origin)?),
        })
    }

    pub fn kind(&self) -> CrdtKind {
        match self {
            CrdtData::GSet(_) => CrdtKind::GSet,
            CrdtData::PnSet(_) => CrdtKind::PnSet,
            CrdtData::GCounter(_) => CrdtKind::GCounter,
            CrdtData::PnCounter(_) => CrdtKind::PnCounter,
            CrdtData::GMap(_) => CrdtKind::GMap,
            CrdtData::OrMap(_) => CrdtKind::OrMap,
            CrdtData::LwwMap(_) => CrdtKind::LwwMap,
            CrdtData::Sequence(_) => CrdtKind::Sequence,
        }
    }

    /// Parse and prepare an operation against the current state. Never mutates.
    pub fn prepare(&self, opcode: &str, payload: &Value, stamp: &WriteStamp) -> CrdtResult<CrdtOp> {
        Ok(match self {
            CrdtData::GSet(s) => CrdtOp::GSet(s.prepare(GSet::parse_request(opcode, payload)?, stamp)?),
            CrdtData::PnSet(s) => CrdtOp::PnSet(s.prepare(PnSet::parse_request(opcode, payload)?, stamp)?),
            CrdtData::GCounter(s) => {
                CrdtOp::GCounter(s.prepare(GCounter::parse_request(opcode, payload)?, stamp)?)
            }
            CrdtData::PnCounter(s) => {
                CrdtOp::PnCounter(s.prepare(PnCounter::parse_request(opcode, payload)?, stamp)?)
            }
            CrdtData::GMap(s) => CrdtOp::GMap(s.prepare(GMap::parse_request(opcode, payload)?, stamp)?),
            CrdtData::OrMap(s) => CrdtOp::OrMap(s.prepare(OrMap::parse_request(opcode, payload)?, stamp)?),
            CrdtData::LwwMap(s) => CrdtOp::LwwMap(s.prepare(LwwMap::parse_request(opcode, payload)?, stamp)?),
            CrdtData::Sequence(s) => {
                CrdtOp::Sequence(s.prepare(Sequence::parse_request(opcode, payload)?, stamp)?)
            }
        })
    }

    pub fn apply(&mut self, op: &CrdtOp) -> CrdtResult<ApplyOutcome> {
        Ok(match (self, op) {
            (CrdtData::GSet(s), CrdtOp::GSet(op)) => s.apply(op),
            (CrdtData::PnSet(s), CrdtOp::PnSet(op)) => s.apply(op),
            (CrdtData::GCounter(s), CrdtOp::GCounter(op)) => s.apply(op),
            (CrdtData::PnCounter(s), CrdtOp::PnCounter(op)) => s.apply(op),
            (CrdtData::GMap(s), CrdtOp::GMap(op)) => s.apply(op),
            (CrdtData::OrMap(s), CrdtOp::OrMap(op)) => s.apply(op),
            (CrdtData::LwwMap(s), CrdtOp::LwwMap(op)) => s.apply(op),
            (CrdtData::Sequence(s), CrdtOp::Sequence(op)) => s.apply(op),
            (data, op) => return Err(mismatch(data.kind(), op.kind())),
        })
    }

    pub fn merge(&mut self, other: &CrdtData) -> CrdtResult<()> {
        match (self, other) {
            (CrdtData::GSet(a), CrdtData::GSet(b)) => a.merge(b),
            (CrdtData::PnSet(a), CrdtData::PnSet(b)) => a.merge(b),
            (CrdtData::GCounter(a), CrdtData::GCounter(b)) => a.merge(b),
            (CrdtData::PnCounter(a), CrdtData::PnCounter(b)) => a.merge(b),
            (CrdtData::GMap(a), CrdtData::GMap(b)) => a.merge(b),
            (CrdtData::OrMap(a), CrdtData::OrMap(b)) => a.merge(b),
            (CrdtData::LwwMap(a), CrdtData::LwwMap(b)) => a.merge(b),
            (CrdtData::Sequence(a), CrdtData::Sequence(b)) => a.merge(b),
            (a, b) => return Err(mismatch(a.kind(), b.kind())),
        }
        Ok(())
    }

    pub fn value(&self) -> Value {
        match self {
            CrdtData::GSet(s) => s.value(),
            CrdtData::PnSet(s) => s.value(),
            CrdtData::GCounter(s) => s.value(),
            CrdtData::PnCounter(s) => s.value(),
            CrdtData::GMap(s) => s.value(),
            CrdtData::OrMap(s) => s.value(),
            CrdtData::LwwMap(s) => s.value(),
            CrdtData::Sequence(s) => s.value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::model::OperationId;
    use serde_json::json;

    fn stamp() -> WriteStamp {
        WriteStamp::new(10, "A", OperationId::new("op-1"))
    }

    #[test]
    fn test_kind_parse_and_display_round_trip() {
        for kind in CrdtKind::ALL {
            assert_eq!(CrdtKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CrdtKind::parse("LWW_MAP"), Some(CrdtKind::LwwMap));
        assert_eq!(CrdtKind::parse("mv-register"), None);
    }

    #[test]
    fn test_every_kind_initializes_empty() {
        for kind in CrdtKind::ALL {
            let data = CrdtData::initialize(kind, None, &stamp()).unwrap();
            assert_eq!(data.kind(), kind);
        }
    }

    #[test]
    fn test_unsupported_opcode_does_not_mutate() {
        let data = CrdtData::initialize(CrdtKind::GCounter, Some(&json!(2)), &stamp()).unwrap();
        let before = data.clone();

        let err = data.prepare("decrement", &json!({}), &stamp()).unwrap_err();

        assert!(matches!(err, CrdtError::UnsupportedOpcode { .. }));
        assert_eq!(data, before);
    }

    #[test]
    fn test_apply_rejects_foreign_operation() {
        let set = CrdtData::initialize(CrdtKind::GSet, None, &stamp()).unwrap();
        let op = set.prepare("add", &json!({"element": "x"}), &stamp()).unwrap();

        let mut counter = CrdtData::initialize(CrdtKind::GCounter, None, &stamp()).unwrap();
        assert!(matches!(counter.apply(&op), Err(CrdtError::KindMismatch { .. })));
    }

    #[test]
    fn test_data_serialization_is_tagged() {
        let data = CrdtData::initialize(CrdtKind::GSet, Some(&json!(["b", "a"])), &stamp()).unwrap();
        let encoded = serde_json::to_value(&data).unwrap();
        assert_eq!(encoded["type"], json!("g-set"));

        let decoded: CrdtData = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, data);
    }
}
