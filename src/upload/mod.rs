//! Object storage uploads.

mod progress;
mod s3;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::logging::Outcome;

pub use self::progress::{PROGRESS_STEP, ProgressTracker, UploadProgress};
pub use self::s3::{S3Settings, S3Uploader};

/// Receives throttled progress events.
pub type ProgressCallback<'a> = dyn Fn(UploadProgress) + Send + Sync + 'a;

/// Outcome of uploading one file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadStatus {
    pub filepath: PathBuf,
    pub key: String,
    pub size: Option<u64>,
    pub started: Option<DateTime<Local>>,
    pub completed: Option<DateTime<Local>>,
    pub exception: Option<String>,
}

impl UploadStatus {
    pub fn new(filepath: &Path, key: &str) -> Self {
        Self {
            filepath: filepath.to_path_buf(),
            key: key.to_string(),
            ..Self::default()
        }
    }

    /// Every field is set and non-empty, and no error was captured.
    pub fn success(&self) -> bool {
        self.exception.is_none()
            && !self.filepath.as_os_str().is_empty()
            && !self.key.is_empty()
            && self.size.is_some_and(|size| size > 0)
            && self.started.is_some()
            && self.completed.is_some()
    }

    /// Transfer time, floored to one second.
    pub fn elapsed(&self) -> Duration {
        let elapsed = match (self.started, self.completed) {
            (Some(started), Some(completed)) => (completed - started).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };
        elapsed.max(Duration::from_secs(1))
    }

    /// Average bytes per second, `None` unless successful.
    pub fn speed(&self) -> Option<f64> {
        if !self.success() {
            return None;
        }
        let size = self.size.unwrap_or_default();
        Some(size as f64 / self.elapsed().as_secs_f64())
    }
}

impl Outcome for UploadStatus {
    fn succeeded(&self) -> bool {
        self.success()
    }
}

/// Transfers a local file to a remote object store.
pub trait Uploader: fmt::Debug {
    /// Provider name, for logs and reports.
    fn provider(&self) -> &str;

    /// Uploads `filepath` under `key`. Failures are captured on the status.
    fn upload(
        &self,
        filepath: &Path,
        key: &str,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> UploadStatus;
}
