/*
    transport.rs - Replica transports

    The synchronizer never talks to peers directly; it hands a SyncRequest to
    a ReplicaTransport and gets the peer's SyncResponse back.

    - InMemoryNetwork: in-process synchronizers behind async mutexes, with
      simulated partitions
    - StoreBackedTransport: replicas sharing one KeyValueStore; the target is
      loaded from its snapshot, answers, and is written back

    InMemoryNetwork locks the target for the duration of an exchange. Two
    replicas syncing with each other at the same moment each hold their own
    lock while waiting for the other's, so the exchange timeout ends one of
    the two exchanges.
*/

use super::protocol::{SyncRequest, SyncResponse};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::core_sync::model::ReplicaId;
use crate::core_sync::store::errors::{SyncError, SyncResult};
use crate::core_sync::store::kv::KeyValueStore;
use crate::core_sync::store::snapshot;
use crate::core_sync::synchronizer::CrdtSynchronizer;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// A synchronizer shared between a driver and a transport
///
/// On an `InMemoryNetwork` every exchange locks the target's mutex. Do not
/// hold one replica's guard while awaiting another replica's round, or that
/// round stalls until its exchange timeout.
pub type SharedSynchronizer = Arc<Mutex<CrdtSynchronizer>>;

#[async_trait]
pub trait ReplicaTransport: Send + Sync {
    /// Run one push-pull exchange with `target`
    async fn exchange(&self, target: &str, request: SyncRequest) -> SyncResult<SyncResponse>;

    /// Replicas reachable through this transport, if it can tell
    async fn discover(&self) -> SyncResult<Vec<ReplicaId>> {
        Ok(Vec::new())
    }
}

fn link(a: &str, b: &str) -> (ReplicaId, ReplicaId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// In-process network of synchronizers
#[derive(Default)]
pub struct InMemoryNetwork {
    replicas: RwLock<HashMap<ReplicaId, SharedSynchronizer>>,
    partitions: RwLock<HashSet<(ReplicaId, ReplicaId)>>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a synchronizer under its replica id
    pub async fn join(&self, synchronizer: SharedSynchronizer) {
        let replica_id = synchronizer.lock().await.replica_id().to_string();
        debug!(replica = %replica_id, "Replica joined network");
        self.replicas.write().await.insert(replica_id, synchronizer);
    }

    pub async fn leave(&self, replica_id: &str) -> bool {
        self.replicas.write().await.remove(replica_id).is_some()
    }

    /// Cut the link between two replicas, both directions
    pub async fn partition(&self, a: &str, b: &str) {
        info!(a = %a, b = %b, "Partitioning replicas");
        self.partitions.write().await.insert(link(a, b));
    }

    pub async fn heal(&self, a: &str, b: &str) {
        self.partitions.write().await.remove(&link(a, b));
    }

    pub async fn heal_all(&self) {
        self.partitions.write().await.clear();
    }

    pub async fn is_partitioned(&self, a: &str, b: &str) -> bool {
        self.partitions.read().await.contains(&link(a, b))
    }
}

#[async_trait]
impl ReplicaTransport for InMemoryNetwork {
    async fn exchange(&self, target: &str, request: SyncRequest) -> SyncResult<SyncResponse> {
        if target == request.origin {
            return Err(SyncError::unavailable(target, "cannot exchange with self"));
        }
        if self.is_partitioned(&request.origin, target).await {
            return Err(SyncError::unavailable(target, "network partition"));
        }

        let peer = self
            .replicas
            .read()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| SyncError::unavailable(target, "not connected"))?;

        let mut peer = peer.lock().await;
        peer.handle_sync_request(request)
    }

    async fn discover(&self) -> SyncResult<Vec<ReplicaId>> {
        let mut ids: Vec<ReplicaId> = self.replicas.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Replicas that share one key-value store
pub struct StoreBackedTransport {
    store: Arc<dyn KeyValueStore>,
    template: SyncConfig,
    time: Arc<dyn Clock>,
    ttl: Option<Duration>,
}

impl StoreBackedTransport {
    /// `template` supplies every setting except the replica id for loaded peers
    pub fn new(store: Arc<dyn KeyValueStore>, template: SyncConfig) -> Self {
        StoreBackedTransport {
            store,
            template,
            time: Arc::new(SystemClock),
            ttl: None,
        }
    }

    pub fn with_clock(mut self, time: Arc<dyn Clock>) -> Self {
        self.time = time;
        self
    }

    pub fn with_snapshot_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl ReplicaTransport for StoreBackedTransport {
    async fn exchange(&self, target: &str, request: SyncRequest) -> SyncResult<SyncResponse> {
        let config = SyncConfig {
            replica_id: target.to_string(),
            ..self.template.clone()
        };
        let mut peer = CrdtSynchronizer::new(config)
            .with_clock(self.time.clone())
            .with_snapshot_ttl(self.ttl);
        if !peer.restore(self.store.as_ref()).await? {
            return Err(SyncError::unavailable(target, "no stored snapshot"));
        }

        let response = peer.handle_sync_request(request)?;
        peer.persist(self.store.as_ref()).await?;
        Ok(response)
    }

    async fn discover(&self) -> SyncResult<Vec<ReplicaId>> {
        snapshot::stored_replicas(self.store.as_ref()).await
    }
}
