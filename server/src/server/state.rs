//! Server state

use std::sync::Arc;

use crate::history::HistoryRecorder;
use crate::reconcile::Reconciler;
use crate::registry::NodeRegistry;
use crate::salt::{ExecuteService, SaltApi};
use crate::slurm::SlurmControl;
use crate::tasks::TaskTracker;

/// Server state shared across handlers
pub struct ServerState {
    pub registry: Arc<NodeRegistry>,
    pub tracker: Arc<TaskTracker>,
    pub slurm: Arc<dyn SlurmControl>,
    pub salt: Arc<dyn SaltApi>,
    pub execute: Arc<ExecuteService>,
    pub history: Arc<HistoryRecorder>,
    pub reconciler: Arc<Reconciler>,
}

impl ServerState {
    pub fn new(
        registry: Arc<NodeRegistry>,
        tracker: Arc<TaskTracker>,
        slurm: Arc<dyn SlurmControl>,
        salt: Arc<dyn SaltApi>,
        execute: Arc<ExecuteService>,
        history: Arc<HistoryRecorder>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            registry,
            tracker,
            slurm,
            salt,
            execute,
            history,
            reconciler,
        }
    }
}
