/*
    propagation.rs - Outbound propagation buffer

    Bounded FIFO of locally issued creations and operations that some known
    replica has not acknowledged yet. Overflow drops the oldest entries from
    the buffer only; the CRDT history and data are untouched, so a dropped
    entry still reaches peers through the next delta.
*/

use crate::core_sync::crdt::VectorClock;
use crate::core_sync::model::{CrdtId, Millis, OperationId};
use crate::metrics::{self, PROPAGATION_DROPPED, PROPAGATION_PENDING};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationEntry {
    pub crdt_id: CrdtId,
    /// `None` for the creation of the CRDT itself
    pub operation_id: Option<OperationId>,
    /// Counter of the issuing replica at issue time
    pub counter: u64,
    pub queued_at: Millis,
}

impl PropagationEntry {
    /// Acknowledged once a peer's object clock for the CRDT covers our counter
    fn acknowledged_by(&self, replica_id: &str, peer_digest: &BTreeMap<CrdtId, VectorClock>) -> bool {
        peer_digest
            .get(&self.crdt_id)
            .map(|clock| clock.get(replica_id) >= self.counter)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationBuffer {
    capacity: usize,
    entries: VecDeque<PropagationEntry>,
    dropped: u64,
}

impl PropagationBuffer {
    pub fn new(capacity: usize) -> Self {
        PropagationBuffer {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, entry: PropagationEntry) {
        self.entries.push_back(entry);
        let mut overflow = 0u64;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            overflow += 1;
        }
        if overflow > 0 {
            self.dropped += overflow;
            warn!(
                dropped = overflow,
                capacity = self.capacity,
                "Propagation buffer full, dropping oldest entries"
            );
            metrics::record_counter(PROPAGATION_DROPPED, overflow);
        }
        metrics::record_gauge(PROPAGATION_PENDING, self.entries.len() as f64);
    }

    /// Remove entries every peer digest acknowledges; returns how many were removed.
    /// Nothing is pruned without at least one peer.
    pub fn prune_acknowledged<'a, I>(&mut self, replica_id: &str, peers: I) -> usize
    where
        I: IntoIterator<Item = &'a BTreeMap<CrdtId, VectorClock>>,
    {
        let peers: Vec<_> = peers.into_iter().collect();
        if peers.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries
            .retain(|entry| !peers.iter().all(|digest| entry.acknowledged_by(replica_id, digest)));
        metrics::record_gauge(PROPAGATION_PENDING, self.entries.len() as f64);
        before - self.entries.len()
    }

    /// Apply a new capacity, trimming the oldest entries if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropagationEntry> {
        self.entries.iter()
    }
}
