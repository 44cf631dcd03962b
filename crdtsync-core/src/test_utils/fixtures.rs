//! Test fixtures for replicas and in-process networks

use crate::clock::ManualClock;
use crate::config::SyncConfig;
use crate::core_sync::sync::{InMemoryNetwork, SharedSynchronizer};
use crate::core_sync::CrdtSynchronizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Builder for test replicas sharing one manual clock
pub struct TestReplicaBuilder {
    config: SyncConfig,
    clock: Arc<ManualClock>,
}

impl TestReplicaBuilder {
    pub fn new(replica_id: &str) -> Self {
        Self {
            config: SyncConfig::for_replica(replica_id),
            clock: Arc::new(ManualClock::new(1_000)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_compaction(mut self, threshold: usize, retain: usize) -> Self {
        self.config.compaction_threshold = threshold;
        self.config.compaction_retain = retain;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.max_pending_operations = capacity;
        self
    }

    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.config.default_strategy = strategy.to_string();
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.config.exchange_timeout = timeout;
        self
    }

    pub fn build(self) -> CrdtSynchronizer {
        CrdtSynchronizer::new(self.config).with_clock(self.clock)
    }

    pub fn build_shared(self) -> SharedSynchronizer {
        Arc::new(Mutex::new(self.build()))
    }
}

/// Shorthand for a replica on its own manual clock
pub fn test_replica(replica_id: &str) -> CrdtSynchronizer {
    TestReplicaBuilder::new(replica_id).build()
}

/// In-process network of shared replicas on one manual clock
pub struct TestCluster {
    pub network: Arc<InMemoryNetwork>,
    pub clock: Arc<ManualClock>,
    pub replicas: Vec<SharedSynchronizer>,
}

impl TestCluster {
    pub async fn new(replica_ids: &[&str]) -> Self {
        let network = Arc::new(InMemoryNetwork::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let mut replicas = Vec::new();
        for id in replica_ids {
            let replica = TestReplicaBuilder::new(id).with_clock(clock.clone()).build_shared();
            network.join(replica.clone()).await;
            replicas.push(replica);
        }
        Self {
            network,
            clock,
            replicas,
        }
    }

    pub fn replica(&self, index: usize) -> SharedSynchronizer {
        self.replicas[index].clone()
    }
}
