//! Directory watcher: turns raw notifications into upload jobs.
//!
//! A dedicated thread receives `notify` events, filters and dedups them
//! synchronously, and hands accepted paths to the upload lane. Nothing on
//! that thread sleeps or touches the network.

mod filter;
mod in_flight;
mod stability;
mod status;
mod watch_event;

pub use filter::SuffixFilter;
pub use in_flight::{InFlightGuard, InFlightSet};
pub use stability::{ProbeFuture, Readiness, ReadinessProbe, StabilityDetector};
pub use status::WatcherStatus;
pub use watch_event::{translate, WatchEvent, WatchEventKind};

use crate::config::{WatchConfig, WatchOptions};
use crate::error::UploaderError;
use crate::events::{EventBus, UploadEventPayload};
use crate::logging::{log_info, log_warn};
use crate::upload_queue::{
    LaneCounters, LaneSender, PipelineContext, UploadClient, UploadJob, UploadLane, LANE_CAPACITY,
};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

const COMPONENT: &str = "watcher";

// Upper bound on how long the event thread takes to notice a stop
const EVENT_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Wrong kind or suffix; nothing was touched
    Ignored,
    /// Path already in flight; event dropped
    Duplicate,
    Queued,
    /// Lane full or closed; the path was released again
    Rejected,
    /// Session stopped
    Stopped,
}

/// Filter → dedup → hand-off. Shared by the notify thread, the initial
/// scan and synthetic events.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    filter: SuffixFilter,
    in_flight: InFlightSet,
    lane: LaneSender,
    bus: EventBus,
    directory: PathBuf,
    accepting: Arc<RwLock<bool>>,
}

impl EventDispatcher {
    pub fn is_accepting(&self) -> bool {
        self.accepting.read().map(|a| *a).unwrap_or(false)
    }

    pub fn dispatch(&self, event: &WatchEvent) -> DispatchOutcome {
        // Held for the whole dispatch so `stop()` cannot return while a job is being queued
        let accepting = match self.accepting.read() {
            Ok(guard) => guard,
            Err(_) => return DispatchOutcome::Stopped,
        };
        if !*accepting {
            return DispatchOutcome::Stopped;
        }

        let Some(path) = self.filter.accept(event) else {
            return DispatchOutcome::Ignored;
        };

        let Some(guard) = self.in_flight.acquire_guard(path) else {
            debug!(path = %path.display(), kind = ?event.kind, "Already in flight, dropping event");
            return DispatchOutcome::Duplicate;
        };

        match self.lane.try_submit(UploadJob::new(guard)) {
            Ok(()) => {
                self.bus.publish(
                    &self.directory,
                    UploadEventPayload::FileQueued {
                        path: path.to_path_buf(),
                    },
                );
                DispatchOutcome::Queued
            }
            Err(e) => {
                log_warn(
                    COMPONENT,
                    &format!("Upload lane refused {}, dropping event", path.display()),
                )
                .unwrap_or_default();
                // Dropping the job releases the in-flight entry
                drop(e.into_job());
                DispatchOutcome::Rejected
            }
        }
    }
}

/// One watch session: one directory, one immutable configuration
pub struct DirectoryWatcher {
    config: Arc<WatchConfig>,
    options: WatchOptions,
    watcher: Option<RecommendedWatcher>,
    thread_handle: Option<thread::JoinHandle<()>>,
    dispatcher: Option<EventDispatcher>,
    accepting: Arc<RwLock<bool>>,
    in_flight: InFlightSet,
    lane: UploadLane,
    bus: EventBus,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("is_running", &self.is_running())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl DirectoryWatcher {
    /// Start watching with the default stability detector and an upload
    /// client built from `options.transfer`. Must run inside a tokio runtime.
    pub fn start(
        config: WatchConfig,
        options: WatchOptions,
        bus: EventBus,
    ) -> Result<Self, UploaderError> {
        let client = UploadClient::new(&options.transfer)?;
        let probe: Arc<dyn ReadinessProbe> = Arc::new(StabilityDetector::new(options.stability));
        Self::start_with(config, options, bus, client, probe)
    }

    pub fn start_with(
        config: WatchConfig,
        options: WatchOptions,
        bus: EventBus,
        client: UploadClient,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Result<Self, UploaderError> {
        let runtime = Handle::try_current().map_err(|_| {
            UploaderError::Other("Directory watcher must be started inside a tokio runtime".to_string())
        })?;

        let watch_dir = prepare_directory(&config.directory)?;
        let config = Arc::new(config);

        let ctx = PipelineContext {
            config: Arc::clone(&config),
            client,
            probe,
            bus: bus.clone(),
            counters: Arc::new(Mutex::new(LaneCounters::default())),
        };
        let lane = UploadLane::start(&runtime, ctx, options.workers, LANE_CAPACITY);
        let lane_sender = lane
            .sender()
            .ok_or_else(|| UploaderError::Other("Upload lane closed before start".to_string()))?;

        let in_flight = InFlightSet::new();
        let accepting = Arc::new(RwLock::new(true));
        let dispatcher = EventDispatcher {
            filter: SuffixFilter::new(&options.suffix),
            in_flight: in_flight.clone(),
            lane: lane_sender,
            bus: bus.clone(),
            directory: config.directory.clone(),
            accepting: Arc::clone(&accepting),
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, Config::default())?;
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| UploaderError::directory_unavailable(&watch_dir, e))?;

        let thread_dispatcher = dispatcher.clone();
        let thread_handle = thread::Builder::new()
            .name("dir-watcher".to_string())
            .spawn(move || Self::file_event_processor(rx, thread_dispatcher))?;

        log_info(
            COMPONENT,
            &format!(
                "Watching {} for *{} files -> {}",
                watch_dir.display(),
                dispatcher.filter.suffix(),
                config.endpoint_url
            ),
        )
        .unwrap_or_default();

        bus.publish(
            &config.directory,
            UploadEventPayload::WatchStarted {
                endpoint_url: config.endpoint_url.clone(),
            },
        );

        if options.scan_existing {
            scan_existing(&dispatcher, &watch_dir);
        }

        Ok(Self {
            config,
            options,
            watcher: Some(watcher),
            thread_handle: Some(thread_handle),
            dispatcher: Some(dispatcher),
            accepting,
            in_flight,
            lane,
            bus,
        })
    }

    fn file_event_processor(
        rx: mpsc::Receiver<Result<Event, notify::Error>>,
        dispatcher: EventDispatcher,
    ) {
        loop {
            if !dispatcher.is_accepting() {
                break;
            }

            match rx.recv_timeout(EVENT_TIMEOUT) {
                Ok(Ok(event)) => {
                    for watch_event in translate(&event) {
                        dispatcher.dispatch(&watch_event);
                    }
                }
                Ok(Err(error)) => {
                    log_warn(COMPONENT, &format!("File watcher error: {}", error)).unwrap_or_default();
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Same directory and settings: restarting would be a no-op
    pub fn matches(&self, config: &WatchConfig, options: &WatchOptions) -> bool {
        self.config.as_ref() == config && &self.options == options
    }

    pub fn is_running(&self) -> bool {
        self.accepting.read().map(|a| *a).unwrap_or(false)
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Feed a synthetic event through the same filter/dedup path as OS
    /// notifications.
    pub fn inject(&self, event: &WatchEvent) -> DispatchOutcome {
        self.dispatcher
            .as_ref()
            .map(|d| d.dispatch(event))
            .unwrap_or(DispatchOutcome::Stopped)
    }

    pub fn status(&self) -> WatcherStatus {
        let counters = self.lane.counters();
        WatcherStatus {
            is_running: self.is_running(),
            directory: Some(self.config.directory.clone()),
            in_flight: self.in_flight.len(),
            queued: counters.queued,
            processing: counters.processing,
            succeeded: counters.succeeded,
            failed: counters.failed,
        }
    }

    /// Release the OS subscription. No event is accepted once this returns;
    /// jobs already in the lane keep running.
    pub fn stop(&mut self) {
        {
            let Ok(mut accepting) = self.accepting.write() else {
                return;
            };
            if !*accepting {
                return;
            }
            *accepting = false;
        }

        self.watcher.take();
        self.dispatcher.take();

        log_info(
            COMPONENT,
            &format!("Stopped watching {}", self.config.directory.display()),
        )
        .unwrap_or_default();
        self.bus
            .publish(&self.config.directory, UploadEventPayload::WatchStopped);
    }

    /// Stop, then wait for every dispatched upload to finish
    pub async fn shutdown(&mut self) {
        self.stop();
        self.lane.drain().await;

        if let Some(handle) = self.thread_handle.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create the directory if needed and make sure it can be listed
fn prepare_directory(dir: &Path) -> Result<PathBuf, UploaderError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| UploaderError::directory_unavailable(dir, e))?;
    }
    if !dir.is_dir() {
        return Err(UploaderError::directory_unavailable(dir, "not a directory"));
    }
    std::fs::read_dir(dir).map_err(|e| UploaderError::directory_unavailable(dir, e))?;

    dir.canonicalize()
        .map_err(|e| UploaderError::directory_unavailable(dir, e))
}

/// Feed files already present through the normal path as "created" events
fn scan_existing(dispatcher: &EventDispatcher, dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log_warn(COMPONENT, &format!("Initial scan of {} failed: {}", dir.display(), e))
                .unwrap_or_default();
            return 0;
        }
    };

    let queued = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            dispatcher.dispatch(&WatchEvent::new(WatchEventKind::Created, entry.path()))
                == DispatchOutcome::Queued
        })
        .count();

    if queued > 0 {
        log_info(
            COMPONENT,
            &format!("Initial scan queued {} existing file(s)", queued),
        )
        .unwrap_or_default();
    }
    queued
}
