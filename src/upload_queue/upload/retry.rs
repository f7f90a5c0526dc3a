//! Retry policy and failure classification for the upload client.
//!
//! Only a received non-2xx response earns a retry, and only one. Transport
//! and file errors are terminal for the attempt.

use crate::error::UploaderError;
use crate::upload_queue::types::UploadErrorKind;
use std::time::Duration;

/// Error classification for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Server answered with a status outside 2xx
    Response,
    /// No response (connect failure, timeout, reset)
    Network,
    /// Local file could not be read
    File,
}

impl ErrorType {
    pub fn kind(self) -> UploadErrorKind {
        match self {
            ErrorType::Response => UploadErrorKind::UnsuccessfulResponse,
            ErrorType::Network => UploadErrorKind::TransportFailure,
            ErrorType::File => UploadErrorKind::FileUnreadable,
        }
    }
}

/// Retry strategy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Fixed pause before each retry
    pub delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryStrategy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// `attempts_made` counts the attempt that just failed
    pub fn should_retry(&self, attempts_made: u32, error_type: ErrorType) -> bool {
        if error_type != ErrorType::Response {
            return false;
        }
        attempts_made <= self.max_retries
    }
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Classify an error produced while attempting an upload
pub fn classify_error(error: &UploaderError) -> ErrorType {
    match error {
        UploaderError::UnsuccessfulResponse { .. } => ErrorType::Response,
        UploaderError::FileUnreadable { .. } => ErrorType::File,
        _ => ErrorType::Network,
    }
}
