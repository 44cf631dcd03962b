/// End-to-end synchronizer tests
///
/// These tests drive the public API only:
/// - Replicas persisted to a file-backed store and restored
/// - Sync through a shared store between separately loaded replicas
/// - JSON commands as a host would send them
/// - The periodic driver over an in-process network
///
/// Run with: cargo test --test e2e_sync_tests

#[cfg(test)]
mod e2e_sync_tests {
    use crdtsync_core::core_sync::sync::{ManualTicker, SessionStatus};
    use crdtsync_core::core_sync::{
        CommandResponse, FileStore, InMemoryNetwork, KeyValueStore, StoreBackedTransport, SyncDriver,
    };
    use crdtsync_core::shutdown::ShutdownCoordinator;
    use crdtsync_core::{CrdtKind, CrdtSynchronizer, SyncCommand, SyncConfig};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    async fn load(id: &str, store: &dyn KeyValueStore) -> CrdtSynchronizer {
        CrdtSynchronizer::load(SyncConfig::for_replica(id), store).await.unwrap()
    }

    /// A replica survives a restart through the file store
    #[tokio::test]
    async fn test_restart_restores_replica() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        let mut a = load("A", &store).await;
        a.create(CrdtKind::OrMap, "profile", None).unwrap();
        a.apply("profile", "set", &json!({"key": "name", "value": "ada"})).unwrap();
        a.create(CrdtKind::Sequence, "doc", Some(&json!(["a", "b"]))).unwrap();
        a.persist(&store).await.unwrap();
        let before = a.stats();
        drop(a);

        let restored = load("A", &store).await;
        assert_eq!(restored.value("profile"), Some(json!({"name": "ada"})));
        assert_eq!(restored.value("doc"), Some(json!(["a", "b"])));
        assert_eq!(restored.clock(), &before.clock);
        assert_eq!(restored.stats().pending_propagation, before.pending_propagation);

        // A fresh replica id shares nothing with A
        let other = load("B", &store).await;
        assert!(other.crdt_ids().is_empty());
    }

    /// Two replicas that only meet through a shared directory
    #[tokio::test]
    async fn test_store_backed_sync_between_processes() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path()));
        let transport = StoreBackedTransport::new(store.clone(), SyncConfig::default());

        let mut b = load("B", store.as_ref()).await;
        b.create(CrdtKind::PnCounter, "stock", Some(&json!(10))).unwrap();
        b.persist(store.as_ref()).await.unwrap();

        let mut a = load("A", store.as_ref()).await;
        a.create(CrdtKind::GSet, "tags", Some(&json!(["new"]))).unwrap();
        a.persist(store.as_ref()).await.unwrap();

        let summary = a.sync_replicas(&transport, None).await.unwrap();
        assert_eq!(summary.status, SessionStatus::Completed);
        assert_eq!(summary.replicas_synced, 1);
        assert_eq!(a.value("stock"), Some(json!(10)));

        a.apply("stock", "decrement", &json!({"amount": 3})).unwrap();
        a.sync_replicas(&transport, None).await.unwrap();

        let b = load("B", store.as_ref()).await;
        assert_eq!(b.value("stock"), Some(json!(7)));
        assert_eq!(b.value("tags"), Some(json!(["new"])));
    }

    /// Commands arrive as JSON and every mutation is persisted
    #[tokio::test]
    async fn test_json_commands_round_trip_through_store() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let network = InMemoryNetwork::new();
        let mut a = load("A", &store).await;

        let commands = [
            json!({"command": "create-crdt", "crdt_type": "lww-map", "crdt_id": "settings"}),
            json!({"command": "apply-operation", "crdt_id": "settings", "opcode": "set",
                   "payload": {"key": "theme", "value": "dark"}}),
            json!({"command": "compact-operations"}),
        ];
        for raw in commands {
            let command: SyncCommand = serde_json::from_value(raw).unwrap();
            a.execute(command, &network, Some(&store)).await.unwrap();
        }

        let merge = SyncCommand::MergeStates {
            crdt_id: "settings".to_string(),
            remote_state: a.get("settings").unwrap().clone(),
        };
        let response = a.execute(merge, &network, Some(&store)).await.unwrap();
        assert!(matches!(response, CommandResponse::Merged(m) if m.operations_applied == 0));

        let restored = load("A", &store).await;
        assert_eq!(restored.value("settings"), Some(json!({"theme": "dark"})));
    }

    /// The driver keeps an in-process cluster converged
    #[tokio::test]
    async fn test_driver_rounds_converge_cluster() {
        let network = Arc::new(InMemoryNetwork::new());
        let replicas: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|id| Arc::new(Mutex::new(CrdtSynchronizer::new(SyncConfig::for_replica(*id)))))
            .collect();
        for replica in &replicas {
            network.join(replica.clone()).await;
        }

        replicas[1].lock().await.create(CrdtKind::GCounter, "visits", None).unwrap();
        replicas[1]
            .lock()
            .await
            .apply("visits", "increment", &json!({"amount": 4}))
            .unwrap();
        replicas[2].lock().await.create(CrdtKind::PnSet, "online", Some(&json!(["c"]))).unwrap();

        let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_secs(1)));
        let driver = SyncDriver::new(replicas[0].clone(), network.clone(), shutdown);

        let (handle, ticker) = ManualTicker::channel(2);
        assert!(handle.tick().await);
        assert!(handle.tick().await);
        drop(handle);
        let report = driver.run(ticker).await;
        assert_eq!(report.rounds, 2);
        assert_eq!(report.failed_rounds, 0);

        for replica in &replicas {
            let replica = replica.lock().await;
            assert_eq!(replica.value("online"), Some(json!(["c"])), "replica {}", replica.replica_id());
        }
        assert_eq!(replicas[2].lock().await.value("visits"), Some(json!(4)));
    }
}
