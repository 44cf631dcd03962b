/*
    driver.rs - Periodic sync loop

    Each tick runs one round against every known replica, compacts histories
    and persists the replica. The loop ends when the ticker runs dry or the
    shutdown coordinator broadcasts.
*/

use super::session::SessionStatus;
use super::transport::{ReplicaTransport, SharedSynchronizer};
use crate::core_sync::store::kv::KeyValueStore;
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Source of sync round triggers
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick; `false` means no more ticks will come
    async fn tick(&mut self) -> bool;
}

/// Fixed-period ticker; the first tick fires immediately
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        IntervalTicker { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticker driven by hand through a [`TickHandle`]
pub struct ManualTicker {
    rx: mpsc::Receiver<()>,
}

#[derive(Clone)]
pub struct TickHandle {
    tx: mpsc::Sender<()>,
}

impl ManualTicker {
    pub fn channel(buffer: usize) -> (TickHandle, ManualTicker) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (TickHandle { tx }, ManualTicker { rx })
    }
}

impl TickHandle {
    /// Returns `false` once the ticker is gone
    pub async fn tick(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub rounds: usize,
    /// Rounds that aborted or left at least one target unsynced
    pub failed_rounds: usize,
    pub operations_synced: usize,
    pub operations_compacted: usize,
}

pub struct SyncDriver {
    synchronizer: SharedSynchronizer,
    transport: Arc<dyn ReplicaTransport>,
    store: Option<Arc<dyn KeyValueStore>>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl SyncDriver {
    pub fn new(
        synchronizer: SharedSynchronizer,
        transport: Arc<dyn ReplicaTransport>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        SyncDriver {
            synchronizer,
            transport,
            store: None,
            shutdown,
        }
    }

    /// Persist the replica after every round
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn run<T: Ticker>(&self, mut ticker: T) -> DriverReport {
        let _guard = self.shutdown.guard();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut report = DriverReport::default();

        if self.shutdown.is_shutting_down().await {
            return report;
        }
        info!("Sync driver started");

        loop {
            tokio::select! {
                biased;

                signal = shutdown_rx.recv() => {
                    match signal {
                        Ok(ShutdownSignal::Graceful) => info!("Sync driver stopping"),
                        Ok(ShutdownSignal::Immediate) => warn!("Sync driver stopping immediately"),
                        Err(e) => warn!(error = %e, "Shutdown channel closed"),
                    }
                    break;
                }

                more = ticker.tick() => {
                    if !more {
                        debug!("Ticker exhausted");
                        break;
                    }
                    self.round(&mut report).await;
                }
            }
        }

        info!(rounds = report.rounds, failed = report.failed_rounds, "Sync driver stopped");
        report
    }

    async fn round(&self, report: &mut DriverReport) {
        let mut synchronizer = self.synchronizer.lock().await;

        report.rounds += 1;
        match synchronizer.sync_replicas(self.transport.as_ref(), None).await {
            Ok(summary) => {
                report.operations_synced += summary.operations_synced;
                if summary.status == SessionStatus::Failed || !summary.failed_replicas.is_empty() {
                    report.failed_rounds += 1;
                }
            }
            Err(e) => {
                warn!(error = %e, "Sync round failed");
                report.failed_rounds += 1;
            }
        }
        report.operations_compacted += synchronizer.compact_operations();

        if let Some(store) = &self.store {
            if let Err(e) = synchronizer.persist(store.as_ref()).await {
                error!(error = %e, "Failed to persist replica");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::core_sync::crdt::CrdtKind;
    use crate::core_sync::store::kv::MemoryStore;
    use crate::core_sync::sync::transport::InMemoryNetwork;
    use crate::core_sync::synchronizer::CrdtSynchronizer;
    use serde_json::json;
    use tokio::sync::Mutex;

    fn shared(id: &str) -> SharedSynchronizer {
        Arc::new(Mutex::new(CrdtSynchronizer::new(SyncConfig::for_replica(id))))
    }

    #[tokio::test]
    async fn test_manual_ticks_drive_rounds() {
        let network = Arc::new(InMemoryNetwork::new());
        let a = shared("A");
        let b = shared("B");
        network.join(a.clone()).await;
        network.join(b.clone()).await;
        a.lock().await.create(CrdtKind::GSet, "s", Some(&json!(["x"]))).unwrap();

        let store = Arc::new(MemoryStore::new());
        let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_millis(50)));
        let driver = SyncDriver::new(a.clone(), network.clone(), shutdown).with_store(store.clone());

        let (handle, ticker) = ManualTicker::channel(4);
        assert!(handle.tick().await);
        assert!(handle.tick().await);
        drop(handle);

        let report = driver.run(ticker).await;
        assert_eq!(report.rounds, 2);
        assert_eq!(report.failed_rounds, 0);
        assert_eq!(b.lock().await.value("s"), Some(json!(["x"])));

        let restored = CrdtSynchronizer::load(SyncConfig::for_replica("A"), store.as_ref())
            .await
            .unwrap();
        assert_eq!(restored.sessions().count(), 2);
    }

    #[tokio::test]
    async fn test_rounds_with_unreachable_peer_count_as_failed() {
        let network = Arc::new(InMemoryNetwork::new());
        let a = shared("A");
        network.join(a.clone()).await;
        network.join(shared("B")).await;
        network.partition("A", "B").await;

        let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_millis(50)));
        let driver = SyncDriver::new(a.clone(), network.clone(), shutdown);

        let (handle, ticker) = ManualTicker::channel(2);
        assert!(handle.tick().await);
        drop(handle);

        let report = driver.run(ticker).await;
        assert_eq!(report.rounds, 1);
        assert_eq!(report.failed_rounds, 1);
        assert_eq!(
            a.lock().await.sessions().last().unwrap().status,
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_driver() {
        let network = Arc::new(InMemoryNetwork::new());
        let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_millis(500)));
        let driver = SyncDriver::new(shared("A"), network, shutdown.clone());

        let (_handle, ticker) = ManualTicker::channel(1);
        let task = tokio::spawn(async move { driver.run(ticker).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.shutdown().await;

        let report = task.await.unwrap();
        assert_eq!(report.rounds, 0);
        assert_eq!(shutdown.active_components(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_fires_each_period() {
        let mut ticker = IntervalTicker::new(Duration::from_secs(5));
        assert!(ticker.tick().await);

        let before = tokio::time::Instant::now();
        assert!(ticker.tick().await);
        assert!(before.elapsed() >= Duration::from_secs(5));
    }
}
