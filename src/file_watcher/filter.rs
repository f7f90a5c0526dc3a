use super::watch_event::WatchEvent;
use crate::config::DEFAULT_SUFFIX;
use std::path::Path;

/// Case-insensitive file-name suffix filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixFilter {
    suffix: String,
}

impl SuffixFilter {
    pub fn new(suffix: &str) -> Self {
        let trimmed = suffix.trim();
        let suffix = if trimmed.is_empty() {
            DEFAULT_SUFFIX
        } else {
            trimmed
        };
        Self {
            suffix: suffix.to_lowercase(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn matches_name(&self, name: &str) -> bool {
        name.to_lowercase().ends_with(&self.suffix)
    }

    pub fn matches_path(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| self.matches_name(name))
            .unwrap_or(false)
    }

    /// The candidate path if the event is worth considering. Pure: rejects
    /// have no side effects.
    pub fn accept<'a>(&self, event: &'a WatchEvent) -> Option<&'a Path> {
        if !event.kind.is_candidate() {
            return None;
        }
        if !self.matches_path(&event.path) {
            return None;
        }
        Some(event.path.as_path())
    }
}

impl Default for SuffixFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SUFFIX)
    }
}
