//! Type definitions for the upload lane.
//!
//! Defines PendingUpload, UploadResult, UploadErrorKind and lane constants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// Queued jobs beyond this are refused and their paths released
pub const LANE_CAPACITY: usize = 64;

/// One (timestamp, byte length) observation taken by the stability detector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizeSample {
    pub taken_at: DateTime<Utc>,
    pub len: u64,
}

/// A file accepted by the watcher, owned by exactly one worker until it concludes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    pub path: PathBuf,
    pub queued_at: DateTime<Utc>,
    pub size_samples: Vec<SizeSample>,
}

impl PendingUpload {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            queued_at: Utc::now(),
            size_samples: Vec::new(),
        }
    }

    pub fn record_sample(&mut self, len: u64) {
        self.size_samples.push(SizeSample {
            taken_at: Utc::now(),
            len,
        });
    }

    pub fn last_size(&self) -> Option<u64> {
        self.size_samples.last().map(|s| s.len)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UploadErrorKind {
    /// No HTTP response at all (connect failure, timeout, reset)
    TransportFailure,
    /// Response received with a non-2xx status, after the single retry
    UnsuccessfulResponse,
    /// The file vanished or could not be opened
    FileUnreadable,
}

impl fmt::Display for UploadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UploadErrorKind::TransportFailure => "transport failure",
            UploadErrorKind::UnsuccessfulResponse => "unsuccessful response",
            UploadErrorKind::FileUnreadable => "file unreadable",
        };
        f.write_str(text)
    }
}

/// Outcome of one upload including its retry. Reported, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResult {
    pub success: bool,
    pub http_status: Option<u16>,
    pub error_kind: Option<UploadErrorKind>,
    pub attempts: u32,
    pub bytes: u64,
    /// Response body (or error text) for display; not parsed
    pub message: Option<String>,
}

impl UploadResult {
    pub fn succeeded(status: u16, attempts: u32, bytes: u64, body: String) -> Self {
        Self {
            success: true,
            http_status: Some(status),
            error_kind: None,
            attempts,
            bytes,
            message: Some(body),
        }
    }

    pub fn failed(
        kind: UploadErrorKind,
        status: Option<u16>,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            http_status: status,
            error_kind: Some(kind),
            attempts,
            bytes: 0,
            message: Some(message.into()),
        }
    }
}

/// Counters shared between the lane and the status snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaneCounters {
    pub queued: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
}
