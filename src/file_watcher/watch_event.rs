//! Platform-independent view of directory notifications.
//!
//! `notify` reports events in several platform-specific shapes; everything
//! downstream only sees `(WatchEventKind, path)` pairs, which is also what
//! tests feed in synthetically.

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Created,
    MovedInto,
    WriteClosed,
    Other,
}

impl WatchEventKind {
    /// Only these kinds can signal a new file worth uploading
    pub fn is_candidate(self) -> bool {
        matches!(
            self,
            WatchEventKind::Created | WatchEventKind::MovedInto | WatchEventKind::WriteClosed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Translate one `notify` event into zero or more watch events
pub fn translate(event: &Event) -> Vec<WatchEvent> {
    let kind = match &event.kind {
        EventKind::Create(CreateKind::Folder) => WatchEventKind::Other,
        EventKind::Create(_) => WatchEventKind::Created,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => WatchEventKind::WriteClosed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::MovedInto,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]; only the destination is new to us
            return event
                .paths
                .get(1)
                .map(|to| vec![WatchEvent::new(WatchEventKind::MovedInto, to.clone())])
                .unwrap_or_default();
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            // Backends that cannot tell the direction of a rename (FSEvents):
            // the path still existing means it was the destination
            return event
                .paths
                .iter()
                .filter(|p| p.exists())
                .map(|p| WatchEvent::new(WatchEventKind::MovedInto, p.clone()))
                .collect();
        }
        _ => WatchEventKind::Other,
    };

    event
        .paths
        .iter()
        .map(|p| WatchEvent::new(kind, p.clone()))
        .collect()
}
