/*
    snapshot.rs - Replica snapshots for restart recovery

    Two documents per replica, both stored through the KeyValueStore:
    - crdtsync/replica/<id>: CRDT states, replica clock, propagation buffer
      and the conflict audit trail
    - crdtsync/registry/<id>: known peer replicas and recent sync sessions

    A missing document loads as `None`; the caller starts empty.
*/

use super::errors::SyncResult;
use super::kv::KeyValueStore;
use super::propagation::PropagationBuffer;
use crate::core_sync::conflict::ConflictResolution;
use crate::core_sync::crdt::VectorClock;
use crate::core_sync::model::{CrdtId, CrdtState, Millis, ReplicaId};
use crate::core_sync::sync::{ReplicaInfo, SyncSession};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const REPLICA_PREFIX: &str = "crdtsync/replica/";
pub const REGISTRY_PREFIX: &str = "crdtsync/registry/";

/// Bumped when the snapshot layout changes incompatibly
pub const SNAPSHOT_FORMAT: u32 = 1;

pub fn replica_key(replica_id: &str) -> String {
    format!("{}{}", REPLICA_PREFIX, replica_id)
}

pub fn registry_key(replica_id: &str) -> String {
    format!("{}{}", REGISTRY_PREFIX, replica_id)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub format: u32,
    pub saved_at: Millis,
    pub crdt_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaSnapshot {
    pub metadata: SnapshotMetadata,
    pub replica_id: ReplicaId,
    pub clock: VectorClock,
    pub crdts: BTreeMap<CrdtId, CrdtState>,
    pub propagation: PropagationBuffer,
    #[serde(default)]
    pub resolutions: Vec<ConflictResolution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub replica_id: ReplicaId,
    pub saved_at: Millis,
    pub replicas: BTreeMap<ReplicaId, ReplicaInfo>,
    #[serde(default)]
    pub sessions: Vec<SyncSession>,
}

async fn save<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    snapshot: &T,
    ttl: Option<Duration>,
) -> SyncResult<()> {
    let value = serde_json::to_value(snapshot)?;
    store.store(key, value, ttl).await?;
    debug!(key = %key, "Snapshot written");
    Ok(())
}

async fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> SyncResult<Option<T>> {
    match store.retrieve(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn save_replica(
    store: &dyn KeyValueStore,
    snapshot: &ReplicaSnapshot,
    ttl: Option<Duration>,
) -> SyncResult<()> {
    save(store, &replica_key(&snapshot.replica_id), snapshot, ttl).await
}

pub async fn load_replica(store: &dyn KeyValueStore, replica_id: &str) -> SyncResult<Option<ReplicaSnapshot>> {
    load(store, &replica_key(replica_id)).await
}

pub async fn save_registry(
    store: &dyn KeyValueStore,
    snapshot: &RegistrySnapshot,
    ttl: Option<Duration>,
) -> SyncResult<()> {
    save(store, &registry_key(&snapshot.replica_id), snapshot, ttl).await
}

pub async fn load_registry(store: &dyn KeyValueStore, replica_id: &str) -> SyncResult<Option<RegistrySnapshot>> {
    load(store, &registry_key(replica_id)).await
}

/// Replica ids with a stored replica snapshot
pub async fn stored_replicas(store: &dyn KeyValueStore) -> SyncResult<Vec<ReplicaId>> {
    Ok(store
        .keys(REPLICA_PREFIX)
        .await?
        .into_iter()
        .filter_map(|key| key.strip_prefix(REPLICA_PREFIX).map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::store::kv::MemoryStore;
    use crate::core_sync::store::SyncError;

    fn replica_snapshot(replica_id: &str) -> ReplicaSnapshot {
        ReplicaSnapshot {
            metadata: SnapshotMetadata {
                format: SNAPSHOT_FORMAT,
                saved_at: 10,
                crdt_count: 0,
            },
            replica_id: replica_id.to_string(),
            clock: VectorClock::from_entries([(replica_id.to_string(), 4)]),
            crdts: BTreeMap::new(),
            propagation: PropagationBuffer::new(8),
            resolutions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_replica_snapshot_save_and_load() {
        let store = MemoryStore::new();
        save_replica(&store, &replica_snapshot("A"), None).await.unwrap();

        let loaded = load_replica(&store, "A").await.unwrap().unwrap();
        assert_eq!(loaded.replica_id, "A");
        assert_eq!(loaded.clock.get("A"), 4);
        assert_eq!(loaded.propagation.capacity(), 8);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let store = MemoryStore::new();
        assert!(load_replica(&store, "nobody").await.unwrap().is_none());
        assert!(load_registry(&store, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_serialization_error() {
        let store = MemoryStore::new();
        store
            .store(&replica_key("A"), serde_json::json!({"bogus": true}), None)
            .await
            .unwrap();

        let result = load_replica(&store, "A").await;
        assert!(matches!(result, Err(SyncError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_stored_replicas_lists_replica_documents_only() {
        let store = MemoryStore::new();
        save_replica(&store, &replica_snapshot("A"), None).await.unwrap();
        save_replica(&store, &replica_snapshot("B"), None).await.unwrap();
        save_registry(
            &store,
            &RegistrySnapshot {
                replica_id: "A".to_string(),
                saved_at: 0,
                replicas: BTreeMap::new(),
                sessions: Vec::new(),
            },
            None,
        )
        .await
        .unwrap();

        assert_eq!(stored_replicas(&store).await.unwrap(), vec!["A", "B"]);
    }
}
