//! Upload client: one multipart POST per file, with a single retry on a
//! non-2xx response.

pub mod multipart;
pub mod retry;

pub use multipart::{build_form, destination_field, FILE_FIELD, PATH_FIELD, TOKEN_FIELD};
pub use retry::{classify_error, is_success, ErrorType, RetryStrategy};

use crate::config::TransferSettings;
use crate::error::UploaderError;
use crate::upload_queue::types::UploadResult;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Response to a single attempt that reached the server
struct AttemptResponse {
    status: u16,
    body: String,
    bytes: u64,
}

#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    retry: RetryStrategy,
}

impl UploadClient {
    pub fn new(settings: &TransferSettings) -> Result<Self, UploaderError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .read_timeout(settings.read_timeout())
            .build()?;

        Ok(Self {
            http,
            retry: RetryStrategy::new(1, settings.retry_delay()),
        })
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Upload one file. Never returns an error: every outcome, including
    /// transport and file failures, is folded into the `UploadResult`.
    pub async fn upload(
        &self,
        path: &Path,
        endpoint_url: &str,
        auth_token: &str,
        destination: Option<&str>,
    ) -> UploadResult {
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(path = %path.display(), attempt = attempts, "Sending upload request");

            let error = match self.attempt(path, endpoint_url, auth_token, destination).await {
                Ok(response) if is_success(response.status) => {
                    return UploadResult::succeeded(
                        response.status,
                        attempts,
                        response.bytes,
                        response.body,
                    );
                }
                Ok(response) => UploaderError::UnsuccessfulResponse {
                    status: response.status,
                    body: response.body,
                },
                Err(e) => e,
            };

            let error_type = classify_error(&error);

            if self.retry.should_retry(attempts, error_type) {
                warn!(
                    path = %path.display(),
                    error = %error,
                    delay_ms = self.retry.delay.as_millis() as u64,
                    "Upload rejected, retrying"
                );
                sleep(self.retry.delay).await;
                continue;
            }

            return match error {
                UploaderError::UnsuccessfulResponse { status, body } => {
                    UploadResult::failed(error_type.kind(), Some(status), attempts, body)
                }
                other => UploadResult::failed(error_type.kind(), None, attempts, other.to_string()),
            };
        }
    }

    /// One request. The form is rebuilt from disk each time since a streamed
    /// body can only be sent once.
    async fn attempt(
        &self,
        path: &Path,
        endpoint_url: &str,
        auth_token: &str,
        destination: Option<&str>,
    ) -> Result<AttemptResponse, UploaderError> {
        let built = build_form(path, auth_token, destination).await?;
        let sent = Arc::clone(&built.sent);

        let response = self
            .http
            .post(endpoint_url)
            .multipart(built.form)
            .send()
            .await
            .map_err(|e| UploaderError::TransportFailure(e.to_string()))?;

        let status = response.status().as_u16();
        // The body is display text only; a failed read does not change the outcome
        let body = response.text().await.unwrap_or_default();

        Ok(AttemptResponse {
            status,
            body,
            bytes: sent.load(Ordering::Relaxed),
        })
    }
}
