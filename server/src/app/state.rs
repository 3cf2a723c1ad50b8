//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::errors::ClusterError;
use crate::history::HistoryRecorder;
use crate::reconcile::Reconciler;
use crate::registry::NodeRegistry;
use crate::remote::SshExecutor;
use crate::salt::{ExecuteService, SaltApi, SaltApiClient};
use crate::slurm::{SlurmControl, SlurmController};
use crate::steps::StepRunner;
use crate::tasks::TaskTracker;

/// Main application state
pub struct AppState {
    /// Node registry
    pub registry: Arc<NodeRegistry>,

    /// Command history store
    pub history: Arc<HistoryRecorder>,

    /// Scheduler controller adapter
    pub slurm: Arc<dyn SlurmControl>,

    /// Config-management adapter
    pub salt: Arc<dyn SaltApi>,

    /// Execute-with-history service
    pub execute: Arc<ExecuteService>,

    /// Task tracker
    pub tracker: Arc<TaskTracker>,

    /// State reconciler
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, ClusterError> {
        info!("Initializing application state...");

        options.storage.setup().await?;

        let registry = Arc::new(NodeRegistry::open(options.storage.nodes_file()).await?);
        let history = Arc::new(HistoryRecorder::open(options.storage.history_file()).await?);

        let slurm: Arc<dyn SlurmControl> =
            Arc::new(SlurmController::new(options.slurm.clone()));
        let salt: Arc<dyn SaltApi> = Arc::new(SaltApiClient::new(options.salt.clone())?);

        let executor = Arc::new(SshExecutor::new());
        let step_runner = Arc::new(StepRunner::new(executor, options.step_runner.clone()));

        let tracker = Arc::new(TaskTracker::new(
            registry.clone(),
            step_runner,
            slurm.clone(),
            salt.clone(),
            options.tracker.clone(),
        ));

        let execute = Arc::new(ExecuteService::new(salt.clone(), history.clone()));

        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            slurm.clone(),
            salt.clone(),
            options.reconciler.clone(),
        ));

        Ok(Self {
            registry,
            history,
            slurm,
            salt,
            execute,
            tracker,
            reconciler,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), ClusterError> {
        info!("Shutting down application state...");
        // The stores persist on every mutation; nothing to flush.
        Ok(())
    }
}
