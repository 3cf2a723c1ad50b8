//! Shared poll-until utility
//!
//! One implementation of "wait for a condition with an interval and a
//! deadline" used everywhere a caller would otherwise hand-roll a sleep loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::ClusterError;

/// Poll options
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay between probes
    pub interval: Duration,

    /// Total budget before giving up
    pub deadline: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(120),
        }
    }
}

/// Repeatedly evaluate `probe` until it yields a value or the deadline passes.
///
/// The probe decides what counts as done by returning `Some`; transient
/// errors inside the probe should map to `None` so polling continues.
pub async fn poll_until<F, Fut, T>(options: &PollOptions, mut probe: F) -> Result<T, ClusterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }
        if started.elapsed() + options.interval > options.deadline {
            return Err(ClusterError::TimeoutError(format!(
                "condition not met within {:?}",
                options.deadline
            )));
        }
        tokio::time::sleep(options.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_poll_until_immediate() {
        let options = PollOptions {
            interval: Duration::from_millis(5),
            deadline: Duration::from_millis(100),
        };
        let result = poll_until(&options, || async { Some(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_poll_until_after_retries() {
        let options = PollOptions {
            interval: Duration::from_millis(5),
            deadline: Duration::from_millis(500),
        };
        let attempts = AtomicU32::new(0);
        let result = poll_until(&options, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { (n >= 3).then_some("done") }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert!(attempts.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn test_poll_until_deadline() {
        let options = PollOptions {
            interval: Duration::from_millis(5),
            deadline: Duration::from_millis(20),
        };
        let result: Result<(), _> = poll_until(&options, || async { None }).await;
        assert!(matches!(result, Err(ClusterError::TimeoutError(_))));
    }
}
