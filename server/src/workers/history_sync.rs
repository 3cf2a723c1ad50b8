//! Command history sync worker
//!
//! Folds salt job results back into the recorded command executions so the
//! history endpoint reflects completion without the dashboard driving it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::history::{CommandStatus, HistoryRecorder};
use crate::salt::SaltApi;

/// History sync worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sync interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(45),
        }
    }
}

/// Run the history sync worker
pub async fn run<S, F>(
    options: &Options,
    salt: Arc<dyn SaltApi>,
    history: Arc<HistoryRecorder>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("History sync worker starting...");

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("History sync worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with sync
            }
        }

        let pending = history.pending().await;
        if pending.is_empty() {
            continue;
        }
        debug!("Checking {} dispatched command(s) for results", pending.len());

        for row in pending {
            let Some(jid) = row.jid.as_deref() else {
                continue;
            };
            match salt.get_job(jid).await {
                Ok(result) if result.has_returns() => {
                    match history.update(jid, CommandStatus::Completed, None).await {
                        Ok(true) => debug!("Job {} completed", jid),
                        Ok(false) => {}
                        Err(e) => error!("Updating history for job {} failed: {}", jid, e),
                    }
                }
                Ok(_) => {
                    // Still running; check again next pass.
                }
                Err(e) if e.is_retryable() => {
                    debug!("Control plane not answering for job {}: {}", jid, e);
                    break;
                }
                Err(e) => {
                    error!("Job lookup for {} failed: {}", jid, e);
                }
            }
        }
    }
}
