//! Cooperative cancellation of a running session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fwupd_errors::{FwupdError, Result};

// Longest uninterrupted sleep while waiting out a retry delay.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared flag that aborts transfers and retry delays.
///
/// Clones share the flag, so one clone can be handed to another thread or a
/// signal handler while the session holds the other.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns a cancelled error.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(FwupdError::cancelled("operation was cancelled"));
        }
        Ok(())
    }

    /// Sleep for `delay`, waking early if cancelled.
    ///
    /// # Errors
    ///
    /// Returns a cancelled error if cancellation was requested before or
    /// during the sleep.
    pub fn sleep(&self, delay: Duration) -> Result<()> {
        let deadline = Instant::now() + delay;
        loop {
            self.check()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}
