//! Bounded retries with a fixed delay.

use std::time::Duration;

use fwupd_errors::{FwupdError, Result};
use tracing::warn;

use crate::cancel::CancellationToken;

/// Run `op` up to `attempts` times, sleeping `delay` between attempts.
///
/// `op` receives the 0-based attempt number. An error for which
/// `is_terminal` returns true, or any cancellation, is returned at once;
/// otherwise the last error is returned after the final attempt, prefixed
/// with the attempt count.
///
/// # Errors
///
/// Returns an invalid-data error if `attempts` is zero, or the error of the
/// last attempt.
pub fn retry_full<T, P, F>(
    attempts: u32,
    delay: Duration,
    cancel: &CancellationToken,
    is_terminal: P,
    mut op: F,
) -> Result<T>
where
    P: Fn(&FwupdError) -> bool,
    F: FnMut(u32) -> Result<T>,
{
    if attempts == 0 {
        return Err(FwupdError::invalid_data("retry attempts must be non-zero"));
    }
    let mut attempt = 0;
    loop {
        cancel.check()?;
        let err = match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if is_terminal(&err) || err.is_terminal() {
            return Err(err);
        }
        attempt += 1;
        if attempt >= attempts {
            return Err(err.prefixed(format!("failed after {attempts} attempts")));
        }
        warn!(attempt, attempts, error = %err, "retrying");
        cancel.sleep(delay)?;
    }
}

/// [`retry_full`] that only stops early for terminal error kinds.
///
/// # Errors
///
/// See [`retry_full`].
pub fn retry<T, F>(attempts: u32, delay: Duration, cancel: &CancellationToken, op: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    retry_full(attempts, delay, cancel, |_err| false, op)
}
