//! Periodic state reconciliation worker

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::reconcile::Reconciler;

/// Reconciler worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Reconcile interval
    pub interval: Duration,

    /// Initial delay before the first pass
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the reconciler worker
pub async fn run<S, F>(
    options: &Options,
    reconciler: Arc<Reconciler>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reconciler worker starting...");

    // Initial delay
    sleep_fn(options.initial_delay).await;

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reconciler worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with reconcile
            }
        }

        debug!("Reconciling node state...");

        match reconciler.reconcile().await {
            Ok(views) => {
                let flagged = views.iter().filter(|v| v.needs_attention).count();
                if flagged > 0 {
                    info!("{} node(s) flagged for operator attention", flagged);
                }
                debug!("Reconciled {} node(s)", views.len());
            }
            Err(e) => {
                error!("Reconcile pass failed: {}", e);
            }
        }
    }
}
