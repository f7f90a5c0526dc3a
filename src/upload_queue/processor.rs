//! Per-job pipeline: wait for the file to settle, upload it, release the path.

use crate::config::WatchConfig;
use crate::events::{EventBus, UploadEventPayload};
use crate::file_watcher::{InFlightGuard, Readiness, ReadinessProbe};
use crate::logging::{log_info, log_warn};
use std::sync::{Arc, Mutex};

use super::types::{LaneCounters, PendingUpload, UploadResult};
use super::upload::UploadClient;

const COMPONENT: &str = "upload-lane";

/// One accepted file plus ownership of its in-flight entry
#[derive(Debug)]
pub struct UploadJob {
    pub pending: PendingUpload,
    pub guard: InFlightGuard,
}

impl UploadJob {
    pub fn new(guard: InFlightGuard) -> Self {
        Self {
            pending: PendingUpload::new(guard.path().to_path_buf()),
            guard,
        }
    }
}

/// Everything a worker needs; cloned into each job task
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<WatchConfig>,
    pub client: UploadClient,
    pub probe: Arc<dyn ReadinessProbe>,
    pub bus: EventBus,
    pub counters: Arc<Mutex<LaneCounters>>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("config", &self.config)
            .field("client", &self.client)
            .field("probe", &"<readiness probe>")
            .field("counters", &self.counters)
            .finish()
    }
}

pub async fn process_job(ctx: &PipelineContext, job: UploadJob) -> UploadResult {
    let UploadJob { mut pending, guard } = job;
    let slot = ProcessingSlot::enter(&ctx.counters);

    let readiness = ctx.probe.wait_until_ready(&mut pending).await;
    if let Readiness::Unsettled { last_len } = readiness {
        log_warn(
            COMPONENT,
            &format!(
                "File {} still changing after sampling window (last size {:?}), uploading anyway",
                pending.file_name(),
                last_len
            ),
        )
        .unwrap_or_default();
    }

    log_info(
        COMPONENT,
        &format!("Uploading {} to {}", pending.file_name(), ctx.config.endpoint_url),
    )
    .unwrap_or_default();

    let result = ctx
        .client
        .upload(
            &pending.path,
            &ctx.config.endpoint_url,
            &ctx.config.auth_token,
            ctx.config.destination_path.as_deref(),
        )
        .await;

    // Re-arm the path before anyone can observe the outcome
    drop(guard);

    handle_result(ctx, &pending, &result);
    slot.finish(result.success);

    result
}

/// Keeps `processing` honest: a job that unwinds before finishing is
/// counted as failed.
struct ProcessingSlot<'a> {
    counters: &'a Arc<Mutex<LaneCounters>>,
    succeeded: bool,
}

impl<'a> ProcessingSlot<'a> {
    fn enter(counters: &'a Arc<Mutex<LaneCounters>>) -> Self {
        update_counters(counters, |c| {
            c.queued = c.queued.saturating_sub(1);
            c.processing += 1;
        });
        Self {
            counters,
            succeeded: false,
        }
    }

    fn finish(mut self, succeeded: bool) {
        self.succeeded = succeeded;
    }
}

impl Drop for ProcessingSlot<'_> {
    fn drop(&mut self) {
        let succeeded = self.succeeded;
        update_counters(self.counters, |c| {
            c.processing = c.processing.saturating_sub(1);
            if succeeded {
                c.succeeded += 1;
            } else {
                c.failed += 1;
            }
        });
    }
}

fn handle_result(ctx: &PipelineContext, pending: &PendingUpload, result: &UploadResult) {
    let payload = match (result.success, result.error_kind) {
        (true, _) => {
            log_info(
                COMPONENT,
                &format!(
                    "Upload successful: {} ({} bytes, HTTP {}, {} attempt(s))",
                    pending.file_name(),
                    result.bytes,
                    result.http_status.unwrap_or_default(),
                    result.attempts
                ),
            )
            .unwrap_or_default();

            UploadEventPayload::UploadSucceeded {
                path: pending.path.clone(),
                status: result.http_status.unwrap_or_default(),
                attempts: result.attempts,
                bytes: result.bytes,
            }
        }
        (false, kind) => {
            let kind = kind.unwrap_or(super::types::UploadErrorKind::TransportFailure);
            let reason = result.message.clone().unwrap_or_default();

            log_warn(
                COMPONENT,
                &format!(
                    "Upload failed: {} ({}, status {:?}, {} attempt(s)): {}",
                    pending.file_name(),
                    kind,
                    result.http_status,
                    result.attempts,
                    reason
                ),
            )
            .unwrap_or_default();

            UploadEventPayload::UploadFailed {
                path: pending.path.clone(),
                kind,
                status: result.http_status,
                reason,
            }
        }
    };

    ctx.bus.publish(&ctx.config.directory, payload);
}

pub(super) fn update_counters<F>(counters: &Arc<Mutex<LaneCounters>>, f: F)
where
    F: FnOnce(&mut LaneCounters),
{
    // A panicking worker may have poisoned the lock; the counters are still usable
    let mut guard = counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard);
}
