//! Execute-with-history service

use std::sync::Arc;

use tracing::{error, info};

use crate::errors::ClusterError;
use crate::history::{CommandExecution, HistoryRecorder};
use crate::salt::client::SaltApi;

/// Dispatches ad-hoc commands and keeps the history invariant: every execute
/// call produces exactly one durable row, written before the dispatch, so the
/// record exists even when the dispatch fails.
pub struct ExecuteService {
    api: Arc<dyn SaltApi>,
    history: Arc<HistoryRecorder>,
}

impl ExecuteService {
    pub fn new(api: Arc<dyn SaltApi>, history: Arc<HistoryRecorder>) -> Self {
        Self { api, history }
    }

    /// Dispatch a command and return its job id
    pub async fn execute(
        &self,
        target: &str,
        function: &str,
        args: Vec<String>,
    ) -> Result<String, ClusterError> {
        let row = CommandExecution::new(target, function, args.clone());
        let id = self.history.record(row).await?;

        match self.api.execute(target, function, &args).await {
            Ok(jid) => {
                info!("Dispatched {} to '{}' as job {}", function, target, jid);
                self.history.attach_jid(id, &jid).await?;
                Ok(jid)
            }
            Err(e) => {
                error!("Dispatch of {} to '{}' failed: {}", function, target, e);
                if let Err(history_err) = self.history.mark_failed(id, &e.to_string()).await {
                    error!("Failed to mark history row: {}", history_err);
                }
                Err(e)
            }
        }
    }
}
