//! Write-completion heuristic.
//!
//! A notification does not mean the writer has finished, so the file length
//! is polled until two consecutive samples agree. If it never settles the
//! detector still lets the upload proceed after one extra delay: refusing to
//! upload forever is worse than an occasional partial read. Under sustained
//! slow writes this can therefore upload an incomplete file.

use crate::config::StabilitySettings;
use crate::upload_queue::PendingUpload;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Two consecutive equal, non-zero samples
    Stable { len: u64 },
    /// Sampling budget exhausted; proceeding anyway
    Unsettled { last_len: Option<u64> },
}

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Readiness> + Send + 'a>>;

/// Decides when a file is ready to upload. There is no error outcome: the
/// future always resolves and the caller always proceeds.
pub trait ReadinessProbe: Send + Sync {
    fn wait_until_ready<'a>(&'a self, pending: &'a mut PendingUpload) -> ProbeFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct StabilityDetector {
    settings: StabilitySettings,
}

impl StabilityDetector {
    pub fn new(settings: StabilitySettings) -> Self {
        Self { settings }
    }

    pub async fn wait(&self, pending: &mut PendingUpload) -> Readiness {
        let mut previous: Option<u64> = None;

        for _ in 0..self.settings.max_attempts {
            let current = current_len(&pending.path).await;

            if let Some(len) = current {
                pending.record_sample(len);
                if previous == Some(len) && len > 0 {
                    debug!(path = %pending.path.display(), len, "File size settled");
                    return Readiness::Stable { len };
                }
            }

            previous = current;
            sleep(self.settings.interval()).await;
        }

        debug!(
            path = %pending.path.display(),
            attempts = self.settings.max_attempts,
            "File size never settled, proceeding after fallback delay"
        );
        sleep(self.settings.fallback_delay()).await;

        Readiness::Unsettled {
            last_len: pending.last_size(),
        }
    }
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::new(StabilitySettings::default())
    }
}

impl ReadinessProbe for StabilityDetector {
    fn wait_until_ready<'a>(&'a self, pending: &'a mut PendingUpload) -> ProbeFuture<'a> {
        Box::pin(self.wait(pending))
    }
}

/// Missing or unreadable files produce no sample
async fn current_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn fast_settings() -> StabilitySettings {
        StabilitySettings {
            interval_ms: 20,
            max_attempts: 10,
            fallback_delay_ms: 40,
        }
    }

    #[tokio::test]
    async fn test_stable_file_proceeds_early() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("done.wbmomo");
        std::fs::write(&path, vec![1u8; 512]).unwrap();

        let detector = StabilityDetector::new(fast_settings());
        let mut pending = PendingUpload::new(path);

        let started = Instant::now();
        let readiness = detector.wait(&mut pending).await;

        assert_eq!(readiness, Readiness::Stable { len: 512 });
        assert_eq!(pending.size_samples.len(), 2);
        // Well inside the full window of 10 * 20ms + 40ms
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_empty_file_never_counts_as_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wbmomo");
        std::fs::write(&path, b"").unwrap();

        let detector = StabilityDetector::new(fast_settings());
        let mut pending = PendingUpload::new(path);

        let readiness = detector.wait(&mut pending).await;
        assert_eq!(readiness, Readiness::Unsettled { last_len: Some(0) });
        assert_eq!(pending.size_samples.len(), 10);
    }

    #[tokio::test]
    async fn test_growing_file_still_proceeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growing.wbmomo");
        std::fs::write(&path, b"x").unwrap();

        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            for _ in 0..40 {
                file.write_all(&[0u8; 64]).unwrap();
                file.flush().unwrap();
                std::thread::sleep(Duration::from_millis(10));
            }
        });

        let settings = StabilitySettings {
            interval_ms: 20,
            max_attempts: 5,
            fallback_delay_ms: 30,
        };
        let detector = StabilityDetector::new(settings);
        let mut pending = PendingUpload::new(path);

        let readiness = tokio::time::timeout(Duration::from_secs(2), detector.wait(&mut pending))
            .await;
        assert!(readiness.is_ok(), "detector must always resolve");
        assert!(!pending.size_samples.is_empty());

        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_file_settles_after_growth() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.wbmomo");
        std::fs::write(&path, b"").unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_millis(15)).await;
                let mut file = std::fs::OpenOptions::new()
                    .append(true)
                    .open(&writer_path)
                    .unwrap();
                file.write_all(&[0u8; 512]).unwrap();
            }
        });

        let detector = StabilityDetector::new(StabilitySettings {
            interval_ms: 50,
            max_attempts: 10,
            fallback_delay_ms: 50,
        });
        let mut pending = PendingUpload::new(path);
        let readiness = detector.wait_until_ready(&mut pending).await;
        writer.await.unwrap();

        assert_eq!(readiness, Readiness::Stable { len: 2048 });
    }

    #[tokio::test]
    async fn test_missing_file_resolves() {
        let dir = tempdir().unwrap();
        let detector = StabilityDetector::new(fast_settings());
        let mut pending = PendingUpload::new(dir.path().join("gone.wbmomo"));

        let readiness = detector.wait(&mut pending).await;
        assert_eq!(readiness, Readiness::Unsettled { last_len: None });
        assert!(pending.size_samples.is_empty());
    }
}
