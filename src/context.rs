// ⏱️ Run Context - cooperative cancellation and deadlines for one run
//
// Checked before every lookup and before every batched write. Writes already
// submitted are never rolled back; re-running is safe because the
// Create/Update decision is hash based.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::SyncError;

#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunContext {
    /// Context that never expires and is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        RunContext {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Share an existing flag, e.g. one flipped by a signal handler.
    pub fn with_flag(cancelled: Arc<AtomicBool>) -> Self {
        RunContext {
            cancelled,
            deadline: None,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Err` once the run should stop.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SyncError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Sleep for `duration`, waking early if the run is cancelled.
    pub fn sleep(&self, duration: Duration) -> Result<(), SyncError> {
        let step = Duration::from_millis(10);
        let until = Instant::now() + duration;

        while Instant::now() < until {
            self.check()?;
            std::thread::sleep(step.min(until.saturating_duration_since(Instant::now())));
        }

        self.check()
    }
}
