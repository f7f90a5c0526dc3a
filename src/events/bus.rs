use super::types::{EventSequence, UploadEvent, UploadEventPayload};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<UploadEvent>;
pub type EventSender = broadcast::Sender<UploadEvent>;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Event bus for distributing upload status events
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: EventSender,
    sequence: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event and return its sequence number.
    /// With no subscribers the event is simply dropped.
    pub fn publish(&self, directory: &Path, payload: UploadEventPayload) -> EventSequence {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let event = UploadEvent {
            sequence,
            timestamp: Utc::now(),
            directory: directory.to_path_buf(),
            payload,
        };

        let _ = self.sender.send(event);
        sequence
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn current_sequence(&self) -> EventSequence {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
