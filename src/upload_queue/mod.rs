//! Upload lane: a bounded job queue drained by a fixed-size worker pool.
//!
//! With one worker (the default) jobs run strictly FIFO, one at a time.

mod processor;
mod types;
pub mod upload;

pub use processor::{process_job, PipelineContext, UploadJob};
pub use types::*;
pub use upload::UploadClient;

use crate::logging::{log_error, log_info};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use processor::update_counters;

/// Why a job could not be queued; the job (and its in-flight guard) comes back
#[derive(Debug)]
pub enum SubmitError {
    Full(UploadJob),
    Closed(UploadJob),
}

impl SubmitError {
    pub fn into_job(self) -> UploadJob {
        match self {
            SubmitError::Full(job) | SubmitError::Closed(job) => job,
        }
    }
}

/// Non-blocking handle for submitting jobs; safe to use from a plain thread
#[derive(Debug, Clone)]
pub struct LaneSender {
    sender: mpsc::Sender<UploadJob>,
    counters: Arc<Mutex<LaneCounters>>,
}

impl LaneSender {
    pub fn try_submit(&self, job: UploadJob) -> Result<(), SubmitError> {
        // Count before sending so the worker's decrement can never run first
        update_counters(&self.counters, |c| c.queued += 1);

        self.sender.try_send(job).map_err(|e| {
            update_counters(&self.counters, |c| c.queued = c.queued.saturating_sub(1));
            match e {
                mpsc::error::TrySendError::Full(job) => SubmitError::Full(job),
                mpsc::error::TrySendError::Closed(job) => SubmitError::Closed(job),
            }
        })
    }
}

#[derive(Debug)]
pub struct UploadLane {
    sender: Option<LaneSender>,
    dispatcher: Option<JoinHandle<()>>,
    counters: Arc<Mutex<LaneCounters>>,
}

impl UploadLane {
    pub fn start(runtime: &Handle, ctx: PipelineContext, workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::clone(&ctx.counters);

        let dispatcher = runtime.spawn(run_dispatcher(receiver, ctx, workers));

        Self {
            sender: Some(LaneSender {
                sender,
                counters: Arc::clone(&counters),
            }),
            dispatcher: Some(dispatcher),
            counters,
        }
    }

    pub fn sender(&self) -> Option<LaneSender> {
        self.sender.clone()
    }

    pub fn counters(&self) -> LaneCounters {
        self.counters
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Stop taking jobs from this handle and wait for everything already
    /// queued to finish. Completes once every other `LaneSender` is dropped.
    pub async fn drain(&mut self) {
        self.sender = None;
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                tracing::error!(error = %e, "Upload lane dispatcher failed");
            }
        }
    }
}

async fn run_dispatcher(mut receiver: mpsc::Receiver<UploadJob>, ctx: PipelineContext, workers: usize) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    log_info(
        "upload-lane",
        &format!("Upload lane started with {} worker(s)", workers),
    )
    .unwrap_or_default();

    while let Some(job) = receiver.recv().await {
        // Waiting for a permit before spawning keeps jobs in FIFO order
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let ctx = ctx.clone();
        tasks.spawn(async move {
            let _permit = permit;
            process_job(&ctx, job).await;
        });

        while let Some(finished) = tasks.try_join_next() {
            report_join(finished);
        }
    }

    while let Some(finished) = tasks.join_next().await {
        report_join(finished);
    }

    log_info("upload-lane", "Upload lane drained").unwrap_or_default();
}

fn report_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        // Unwinding already released the path and settled the counters
        log_error("upload-lane", &format!("Upload worker panicked: {}", e)).unwrap_or_default();
    }
}
