use std::path::PathBuf;
use thiserror::Error;

/// Auto uploader errors
#[derive(Debug, Error)]
pub enum UploaderError {
    /// Watch target cannot be created or opened
    #[error("Directory unavailable: {path}: {reason}")]
    DirectoryUnavailable { path: PathBuf, reason: String },

    /// No HTTP response was obtained (connect failure, timeout)
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Response received but the status is outside 2xx
    #[error("Unsuccessful response: status {status}")]
    UnsuccessfulResponse { status: u16, body: String },

    /// The file vanished or could not be opened before upload
    #[error("File unreadable: {path}: {reason}")]
    FileUnreadable { path: PathBuf, reason: String },

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (missing fields, bad URL, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// File watcher errors
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Mutex poison error
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl UploaderError {
    pub fn directory_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        UploaderError::DirectoryUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn file_unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        UploaderError::FileUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convert UploaderError to String for status text
impl From<UploaderError> for String {
    fn from(err: UploaderError) -> String {
        err.to_string()
    }
}

impl From<Box<dyn std::error::Error>> for UploaderError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        UploaderError::Other(err.to_string())
    }
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, UploaderError>;
}

impl<T, E: Into<UploaderError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, UploaderError> {
        self.map_err(|e| {
            let err: UploaderError = e.into();
            match err {
                UploaderError::Other(s) => UploaderError::Other(format!("{}: {}", msg, s)),
                UploaderError::Config(s) => UploaderError::Config(format!("{}: {}", msg, s)),
                UploaderError::Validation(s) => {
                    UploaderError::Validation(format!("{}: {}", msg, s))
                }
                UploaderError::TransportFailure(s) => {
                    UploaderError::TransportFailure(format!("{}: {}", msg, s))
                }
                UploaderError::LockPoisoned(s) => {
                    UploaderError::LockPoisoned(format!("{}: {}", msg, s))
                }
                other => other,
            }
        })
    }
}
