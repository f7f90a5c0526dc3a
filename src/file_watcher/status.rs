use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Snapshot of a watch session for status display
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatcherStatus {
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    pub directory: Option<PathBuf>,
    #[serde(rename = "inFlight")]
    pub in_flight: usize,
    pub queued: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl WatcherStatus {
    pub fn idle() -> Self {
        Self::default()
    }
}
