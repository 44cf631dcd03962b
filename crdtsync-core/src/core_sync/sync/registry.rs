/*
    registry.rs - Peer replica registry

    Tracks every replica this one has heard of: when it was last seen, the
    last replica clock and per-CRDT digest it reported, and its sync status.
    Entries are created lazily on first contact and never deleted.

    Reachability:
    - a replica is offline when its last-seen age exceeds the staleness window
    - the cluster view is partitioned when fewer than `partition_threshold`
      of the known replicas are reachable (informational, never blocks sync)
*/

use crate::core_sync::crdt::VectorClock;
use crate::core_sync::model::{CrdtId, Millis, ReplicaId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaStatus {
    /// Registered but never exchanged with
    Unknown,
    /// Contacted, exchange in progress or one-sided
    Active,
    /// Both sides hold identical digests after the last exchange
    Synced,
    /// Digests still differ after the last exchange, or it failed
    Diverged,
    /// The last exchange had to resolve conflicts
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    /// Every known replica is reachable and synced
    Converged,
    Eventual,
    /// Reachable fraction below the partition threshold
    Partitioned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub id: ReplicaId,
    /// `None` until the first successful contact
    pub last_seen: Option<Millis>,
    pub last_known_clock: VectorClock,
    /// Object clocks the replica reported, per CRDT
    #[serde(default)]
    pub digest: BTreeMap<CrdtId, VectorClock>,
    pub status: ReplicaStatus,
    pub operation_count: usize,
    pub online: bool,
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl ReplicaInfo {
    pub fn new(id: impl Into<ReplicaId>) -> Self {
        ReplicaInfo {
            id: id.into(),
            last_seen: None,
            last_known_clock: VectorClock::new(),
            digest: BTreeMap::new(),
            status: ReplicaStatus::Unknown,
            operation_count: 0,
            online: false,
            consecutive_failures: 0,
        }
    }

    pub fn is_stale(&self, now: Millis, staleness_ms: u64) -> bool {
        match self.last_seen {
            Some(seen) => now.saturating_sub(seen) > staleness_ms,
            None => true,
        }
    }
}

/// Reachability snapshot of the known replicas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionStatus {
    pub known: usize,
    pub reachable: usize,
    pub partitioned: bool,
}

impl PartitionStatus {
    pub fn reachable_ratio(&self) -> f64 {
        if self.known == 0 {
            1.0
        } else {
            self.reachable as f64 / self.known as f64
        }
    }
}

/// What one exchange told us about a peer
#[derive(Debug, Clone)]
pub struct ExchangeReport {
    pub clock: VectorClock,
    pub digest: BTreeMap<CrdtId, VectorClock>,
    pub operation_count: usize,
    pub status: ReplicaStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicaRegistry {
    replicas: BTreeMap<ReplicaId, ReplicaInfo>,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_replicas(replicas: BTreeMap<ReplicaId, ReplicaInfo>) -> Self {
        ReplicaRegistry { replicas }
    }

    /// Register a replica if it is not known yet
    pub fn register(&mut self, replica_id: &str) -> &mut ReplicaInfo {
        self.replicas
            .entry(replica_id.to_string())
            .or_insert_with(|| {
                debug!(replica = %replica_id, "Registered replica");
                ReplicaInfo::new(replica_id)
            })
    }

    pub fn get(&self, replica_id: &str) -> Option<&ReplicaInfo> {
        self.replicas.get(replica_id)
    }

    pub fn ids(&self) -> Vec<ReplicaId> {
        self.replicas.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicaInfo> {
        self.replicas.values()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn replicas(&self) -> &BTreeMap<ReplicaId, ReplicaInfo> {
        &self.replicas
    }

    /// The peer contacted us with its clock and digest
    pub fn record_contact(
        &mut self,
        replica_id: &str,
        clock: &VectorClock,
        digest: &BTreeMap<CrdtId, VectorClock>,
        now: Millis,
    ) {
        let info = self.register(replica_id);
        info.last_seen = Some(now);
        info.last_known_clock.merge(clock);
        merge_digest(&mut info.digest, digest);
        info.online = true;
        info.consecutive_failures = 0;
        if info.status == ReplicaStatus::Unknown {
            info.status = ReplicaStatus::Active;
        }
    }

    /// A full exchange with the peer completed
    pub fn record_exchange(&mut self, replica_id: &str, report: ExchangeReport, now: Millis) {
        let info = self.register(replica_id);
        info.last_seen = Some(now);
        info.last_known_clock.merge(&report.clock);
        merge_digest(&mut info.digest, &report.digest);
        info.operation_count = report.operation_count;
        info.status = report.status;
        info.online = true;
        info.consecutive_failures = 0;
    }

    /// An exchange with the peer failed
    pub fn record_failure(&mut self, replica_id: &str, now: Millis, staleness_ms: u64) {
        let info = self.register(replica_id);
        info.consecutive_failures += 1;
        if info.is_stale(now, staleness_ms) {
            info.online = false;
        }
        if info.status != ReplicaStatus::Unknown {
            info.status = ReplicaStatus::Diverged;
        }
    }

    /// Flag replicas whose last contact is older than the staleness window
    pub fn refresh_liveness(&mut self, now: Millis, staleness_ms: u64) -> Vec<ReplicaId> {
        let mut went_offline = Vec::new();
        for info in self.replicas.values_mut() {
            if info.online && info.is_stale(now, staleness_ms) {
                info.online = false;
                went_offline.push(info.id.clone());
            }
        }
        went_offline
    }

    pub fn partition_status(&self, threshold: f64) -> PartitionStatus {
        let known = self.replicas.len();
        let reachable = self.replicas.values().filter(|r| r.online).count();
        let status = PartitionStatus {
            known,
            reachable,
            partitioned: false,
        };
        PartitionStatus {
            partitioned: known > 0 && status.reachable_ratio() < threshold,
            ..status
        }
    }

    pub fn consistency_level(&self, threshold: f64) -> ConsistencyLevel {
        if self.partition_status(threshold).partitioned {
            ConsistencyLevel::Partitioned
        } else if self
            .replicas
            .values()
            .all(|r| r.online && r.status == ReplicaStatus::Synced)
        {
            ConsistencyLevel::Converged
        } else {
            ConsistencyLevel::Eventual
        }
    }

    pub fn digests(&self) -> impl Iterator<Item = &BTreeMap<CrdtId, VectorClock>> {
        self.replicas.values().map(|r| &r.digest)
    }
}

fn merge_digest(into: &mut BTreeMap<CrdtId, VectorClock>, from: &BTreeMap<CrdtId, VectorClock>) {
    for (crdt_id, clock) in from {
        into.entry(crdt_id.clone()).or_default().merge(clock);
    }
}
