use crate::upload_queue::UploadErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sequence number for ordering events
pub type EventSequence = u64;

/// Everything a caller can observe about a watch session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    pub directory: PathBuf,
    pub payload: UploadEventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEventPayload {
    WatchStarted {
        endpoint_url: String,
    },

    WatchStopped,

    /// Path accepted by the filter and handed to the lane
    FileQueued {
        path: PathBuf,
    },

    UploadSucceeded {
        path: PathBuf,
        status: u16,
        attempts: u32,
        bytes: u64,
    },

    /// Terminal failure; nothing will retry this path until a new event arrives
    UploadFailed {
        path: PathBuf,
        kind: UploadErrorKind,
        status: Option<u16>,
        reason: String,
    },
}

impl UploadEvent {
    pub fn path(&self) -> Option<&PathBuf> {
        match &self.payload {
            UploadEventPayload::FileQueued { path }
            | UploadEventPayload::UploadSucceeded { path, .. }
            | UploadEventPayload::UploadFailed { path, .. } => Some(path),
            UploadEventPayload::WatchStarted { .. } | UploadEventPayload::WatchStopped => None,
        }
    }

    pub fn payload_type(&self) -> &str {
        match &self.payload {
            UploadEventPayload::WatchStarted { .. } => "watch_started",
            UploadEventPayload::WatchStopped => "watch_stopped",
            UploadEventPayload::FileQueued { .. } => "file_queued",
            UploadEventPayload::UploadSucceeded { .. } => "upload_succeeded",
            UploadEventPayload::UploadFailed { .. } => "upload_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.payload, UploadEventPayload::UploadFailed { .. })
    }

    /// One-line status text for display
    pub fn status_line(&self) -> String {
        match &self.payload {
            UploadEventPayload::WatchStarted { endpoint_url } => format!(
                "Watching {} -> {}",
                self.directory.display(),
                endpoint_url
            ),
            UploadEventPayload::WatchStopped => {
                format!("Stopped watching {}", self.directory.display())
            }
            UploadEventPayload::FileQueued { path } => {
                format!("Queued {}", display_name(path))
            }
            UploadEventPayload::UploadSucceeded {
                path,
                status,
                attempts,
                bytes,
            } => format!(
                "Uploaded {} ({} bytes, HTTP {}, attempt {})",
                display_name(path),
                bytes,
                status,
                attempts
            ),
            UploadEventPayload::UploadFailed {
                path,
                kind,
                status,
                reason,
            } => match status {
                Some(code) => format!(
                    "Upload failed for {}: {} (HTTP {}) {}",
                    display_name(path),
                    kind,
                    code,
                    reason
                ),
                None => format!(
                    "Upload failed for {}: {} {}",
                    display_name(path),
                    kind,
                    reason
                ),
            },
        }
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
