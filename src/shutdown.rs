use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown between the signal handler, the status
/// handler and the watch session.
///
/// Usage:
/// ```no_run
/// use auto_uploader::shutdown::ShutdownCoordinator;
///
/// # async fn example() {
/// let coordinator = ShutdownCoordinator::new();
/// let mut shutdown_rx = coordinator.subscribe();
///
/// tokio::spawn(async move {
///     let _ = shutdown_rx.recv().await;
///     // stop accepting work here
/// });
///
/// coordinator.shutdown();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(10);
        Self {
            shutdown_tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receivers created after `shutdown()` will not see the signal; check
    /// `is_shutdown()` first or use `wait()`.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal all subscribers. Repeated calls are harmless.
    pub fn shutdown(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested, including before this call.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = rx.recv().await;
    }

    pub fn has_subscribers(&self) -> bool {
        self.shutdown_tx.receiver_count() > 0
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
