use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Paths currently owned by a worker. Test-and-insert happens under one lock,
/// so exactly one caller wins for a given path.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds a consistent set: every critical section is a single insert/remove
    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `true` means the caller now owns processing of `path`
    pub fn try_acquire(&self, path: &Path) -> bool {
        self.lock().insert(path.to_path_buf())
    }

    /// Idempotent; releasing a path that was never acquired is a no-op
    pub fn release(&self, path: &Path) {
        self.lock().remove(path);
    }

    /// Acquire and get a guard that releases on drop, even if the worker panics
    pub fn acquire_guard(&self, path: &Path) -> Option<InFlightGuard> {
        if self.try_acquire(path) {
            Some(InFlightGuard {
                set: self.clone(),
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Ownership of one in-flight path
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlightSet,
    path: PathBuf,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.release(&self.path);
    }
}
