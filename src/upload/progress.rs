use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// Minimum advance, in percentage points, between two emitted events.
pub const PROGRESS_STEP: u8 = 10;

/// Snapshot of an upload in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadProgress {
    /// Percentage transferred, `0..=100`.
    pub progress: u8,
    /// Time since the upload started, at least one second.
    pub elapsed: Duration,
    /// Average speed in bytes per second.
    pub speed: f64,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Default)]
struct State {
    uploaded: u64,
    reported: u8,
}

/// Folds high-frequency byte deltas into throttled [`UploadProgress`] events.
///
/// An event is produced when the percentage has advanced by at least
/// [`PROGRESS_STEP`] points since the last one, or when 100% is reached and has
/// not been reported yet. Safe to feed from concurrent transfer tasks.
#[derive(Debug)]
pub struct ProgressTracker {
    filesize: u64,
    started: Instant,
    state: Mutex<State>,
}

impl ProgressTracker {
    pub fn new(filesize: u64) -> Self {
        Self {
            filesize,
            started: Instant::now(),
            state: Mutex::new(State::default()),
        }
    }

    /// Records `delta` more bytes, returning an event if one is due.
    pub fn advance(&self, delta: u64) -> Option<UploadProgress> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.uploaded = state.uploaded.saturating_add(delta);
        let percent = percent(state.uploaded, self.filesize);
        let due = percent >= state.reported.saturating_add(PROGRESS_STEP)
            || (percent == 100 && state.reported < 100);
        if !due {
            return None;
        }
        state.reported = percent;
        let elapsed = self.started.elapsed().max(Duration::from_secs(1));
        Some(UploadProgress {
            progress: percent,
            elapsed,
            speed: state.uploaded as f64 / elapsed.as_secs_f64(),
            timestamp: Local::now(),
        })
    }

    /// Total bytes recorded so far.
    pub fn uploaded(&self) -> u64 {
        match self.state.lock() {
            Ok(guard) => guard.uploaded,
            Err(poisoned) => poisoned.into_inner().uploaded,
        }
    }
}

/// `floor(uploaded / filesize * 100)`, capped at 100. An empty file is complete.
fn percent(uploaded: u64, filesize: u64) -> u8 {
    if filesize == 0 {
        return 100;
    }
    let percent = u128::from(uploaded) * 100 / u128::from(filesize);
    u8::try_from(percent.min(100)).unwrap_or(100)
}
