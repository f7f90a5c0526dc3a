use crate::config::{TransferSettings, WatchConfig, WatchOptions};
use crate::events::EventBus;
use crate::file_watcher::{DirectoryWatcher, WatcherStatus};
use crate::logging::{log_info, read_component_logs, LogEntry};
use crate::upload_queue::{UploadClient, UploadResult};
use std::path::Path;
use tokio::sync::Mutex;

pub struct AppState {
    pub watcher: Mutex<Option<DirectoryWatcher>>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            watcher: Mutex::new(None),
            event_bus,
        }
    }
}

/// Start watching. A session with identical settings is left running; any
/// other session is stopped and drained first.
pub async fn start_watch(
    state: &AppState,
    config: WatchConfig,
    options: WatchOptions,
) -> Result<(), String> {
    let mut slot = state.watcher.lock().await;

    if let Some(current) = slot.as_ref() {
        if current.is_running() && current.matches(&config, &options) {
            return Ok(());
        }
    }

    if let Some(mut previous) = slot.take() {
        log_info(
            "watcher",
            &format!(
                "Replacing watch session on {}",
                previous.config().directory.display()
            ),
        )
        .unwrap_or_default();
        previous.shutdown().await;
    }

    let watcher = DirectoryWatcher::start(config, options, state.event_bus.clone())
        .map_err(|e| format!("Failed to start directory watcher: {}", e))?;
    *slot = Some(watcher);

    Ok(())
}

/// Stop the current session, letting dispatched uploads finish
pub async fn stop_watch(state: &AppState) -> Result<(), String> {
    let mut slot = state.watcher.lock().await;
    if let Some(mut watcher) = slot.take() {
        watcher.shutdown().await;
    }
    Ok(())
}

pub async fn get_watch_status(state: &AppState) -> Result<WatcherStatus, String> {
    let slot = state.watcher.lock().await;
    Ok(slot
        .as_ref()
        .map(|w| w.status())
        .unwrap_or_else(WatcherStatus::idle))
}

/// One-shot upload of a single file, bypassing the watcher
pub async fn upload_once(
    path: &Path,
    endpoint_url: &str,
    auth_token: &str,
    destination: Option<&str>,
    transfer: &TransferSettings,
) -> Result<UploadResult, String> {
    crate::config::validate_endpoint_url(endpoint_url)?;
    let client = UploadClient::new(transfer)?;
    Ok(client.upload(path, endpoint_url, auth_token, destination).await)
}

pub async fn get_component_logs(component: String, max_lines: Option<usize>) -> Result<Vec<LogEntry>, String> {
    read_component_logs(&component, max_lines).map_err(|e| e.to_string())
}
