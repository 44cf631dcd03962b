//! Graceful shutdown coordinator
//!
//! The periodic sync driver subscribes here and holds a [`ShutdownGuard`] for
//! as long as a round may be in flight; `shutdown()` waits for every guard to
//! drop (bounded by the grace timeout) so the final snapshot gets written.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Graceful,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

#[derive(Debug, Default)]
struct ActiveComponents {
    count: AtomicUsize,
    drained: Notify,
}

/// Held by a running component; dropping it marks the component as drained
#[derive(Debug)]
pub struct ShutdownGuard {
    active: Arc<ActiveComponents>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if self.active.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.active.drained.notify_waiters();
        }
    }
}

pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    active: Arc<ActiveComponents>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// `timeout` bounds how long a graceful shutdown waits for guards to drop
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            active: Arc::new(ActiveComponents::default()),
            timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// Register a running component
    pub fn guard(&self) -> ShutdownGuard {
        self.active.count.fetch_add(1, Ordering::SeqCst);
        ShutdownGuard {
            active: self.active.clone(),
        }
    }

    pub fn active_components(&self) -> usize {
        self.active.count.load(Ordering::SeqCst)
    }

    /// Broadcast a graceful shutdown and wait for registered components to drain
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown");

        {
            let mut state = self.state.write().await;
            if *state != ShutdownState::Running {
                warn!("Shutdown already in progress");
                return;
            }
            *state = ShutdownState::ShuttingDown;
        }

        // No receivers is fine: nothing is running
        let _ = self.shutdown_tx.send(ShutdownSignal::Graceful);

        let drained = async {
            loop {
                let notified = self.active.drained.notified();
                if self.active_components() == 0 {
                    break;
                }
                notified.await;
            }
        };

        if tokio::time::timeout(self.timeout, drained).await.is_err() {
            warn!(
                remaining = self.active_components(),
                "Shutdown grace period elapsed with components still running"
            );
        }

        *self.state.write().await = ShutdownState::Shutdown;
        info!("Shutdown complete");
    }

    /// Broadcast an immediate shutdown without waiting
    pub async fn shutdown_immediately(&self) {
        warn!("Initiating immediate shutdown");

        *self.state.write().await = ShutdownState::Shutdown;

        if self.shutdown_tx.send(ShutdownSignal::Immediate).is_err() {
            info!("No running components to notify");
        }
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.state.read().await != ShutdownState::Running
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }
}

/// Trigger a graceful shutdown on SIGINT/SIGTERM
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        coordinator.shutdown().await;
    });
}

#[cfg(not(unix))]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("Received Ctrl+C");
        coordinator.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_without_components_completes() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        assert_eq!(coordinator.state().await, ShutdownState::Running);

        coordinator.shutdown().await;

        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_guard() {
        let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_secs(5)));
        let guard = coordinator.guard();
        let mut rx = coordinator.subscribe();

        let component = tokio::spawn(async move {
            let signal = rx.recv().await.unwrap();
            assert_eq!(signal, ShutdownSignal::Graceful);
            drop(guard);
        });

        coordinator.shutdown().await;
        component.await.unwrap();

        assert_eq!(coordinator.active_components(), 0);
        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_gives_up_after_timeout() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        let _stuck = coordinator.guard();

        coordinator.shutdown().await;

        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);
        assert_eq!(coordinator.active_components(), 1);
    }

    #[tokio::test]
    async fn test_second_shutdown_is_ignored() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        coordinator.shutdown().await;
        coordinator.shutdown().await;
        assert!(coordinator.is_shutting_down().await);
    }
}
