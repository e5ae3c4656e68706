//! Timeout guard
//!
//! Every connector operation is raced against a timer. The operation runs on
//! its own task: when the timer wins the task is abandoned, not aborted, and
//! whatever it eventually produces is discarded. A socket registration that is
//! already on the wire cannot be taken back, so callers must tolerate an
//! operation that reports a timeout and then completes anyway.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::StpError;

/// Timeout applied when a call does not supply a usable one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolve a caller-supplied timeout.
///
/// `None` and zero both mean "use the default"; neither ever means "wait forever".
pub fn effective_timeout(requested: Option<Duration>, default: Duration) -> Duration {
    let default = if default.is_zero() { DEFAULT_TIMEOUT } else { default };
    match requested {
        Some(timeout) if !timeout.is_zero() => timeout,
        _ => default,
    }
}

/// Race `operation` against `timeout`; the first to finish wins.
pub async fn race<T, F>(operation: &str, timeout: Duration, future: F) -> Result<T, StpError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, StpError>> + Send + 'static,
{
    let task = tokio::spawn(future);

    tokio::select! {
        joined = task => match joined {
            Ok(result) => result,
            Err(e) => Err(StpError::Internal(format!("{} task failed: {}", operation, e))),
        },
        _ = tokio::time::sleep(timeout) => {
            debug!(operation = %operation, timeout = ?timeout, "Timed out, abandoning operation");
            Err(StpError::Timeout {
                operation: operation.to_string(),
                timeout,
            })
        }
    }
}
