use super::{EventBus, UploadEvent};
use crate::logging::{log_component_event, log_info};
use crate::shutdown::ShutdownCoordinator;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const COMPONENT: &str = "uploads";

/// Writes every upload event to the activity log and keeps the latest
/// status line for whoever displays it.
pub struct StatusLogHandler {
    event_bus: EventBus,
    shutdown: ShutdownCoordinator,
    last_status: Arc<Mutex<Option<String>>>,
}

impl StatusLogHandler {
    pub fn new(event_bus: EventBus, shutdown: ShutdownCoordinator) -> Self {
        Self {
            event_bus,
            shutdown,
            last_status: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared view of the most recent status line
    pub fn status_handle(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.last_status)
    }

    pub fn start(self) -> JoinHandle<()> {
        // Subscribe before spawning so no event published after `start` returns is missed
        let mut rx = self.event_bus.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => {
                        match result {
                            Ok(event) => self.handle_event(&event),
                            Err(broadcast::error::RecvError::Closed) => {
                                log_info("events", "Status handler stopped (event bus closed)").unwrap_or_default();
                                break;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!(skipped = n, "Status handler lagged behind event bus");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        // Drain whatever is already buffered so the final outcomes are recorded
                        while let Ok(event) = rx.try_recv() {
                            self.handle_event(&event);
                        }
                        log_info("events", "Status handler gracefully shutting down").unwrap_or_default();
                        break;
                    }
                }
            }
        })
    }

    fn handle_event(&self, event: &UploadEvent) {
        let line = event.status_line();
        let level = if event.is_failure() { "WARN" } else { "INFO" };

        let details = serde_json::to_value(event).ok();
        log_component_event(COMPONENT, level, &line, details).unwrap_or_default();

        if let Ok(mut status) = self.last_status.lock() {
            *status = Some(line);
        }
    }
}
