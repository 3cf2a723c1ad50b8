//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::errors::ClusterError;
use crate::poll::PollOptions;
use crate::reconcile::ReconcilerOptions;
use crate::salt::SaltApiOptions;
use crate::server::serve::ServerOptions;
use crate::slurm::SlurmControllerOptions;
use crate::steps::StepRunnerOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::tasks::TaskTrackerOptions;
use crate::workers::{history_sync, reconciler};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// HTTP server configuration
    pub server: ServerOptions,

    /// SLURM controller configuration
    pub slurm: SlurmControllerOptions,

    /// salt-api client configuration
    pub salt: SaltApiOptions,

    /// Task tracker configuration
    pub tracker: TaskTrackerOptions,

    /// Step runner timeouts
    pub step_runner: StepRunnerOptions,

    /// Reconciler configuration
    pub reconciler: ReconcilerOptions,

    /// Enable the periodic reconciler worker
    pub enable_reconciler: bool,

    /// Enable the history sync worker
    pub enable_history_sync: bool,

    /// Reconciler worker options
    pub reconciler_worker: reconciler::Options,

    /// History sync worker options
    pub history_sync_worker: history_sync::Options,
}

impl AppOptions {
    /// Build runtime options from the settings file
    pub fn from_settings(
        settings: &Settings,
        storage: StorageLayout,
    ) -> Result<Self, ClusterError> {
        let api_url = Url::parse(&settings.salt.api_url).map_err(|e| {
            ClusterError::ConfigError(format!("salt api_url '{}': {}", settings.salt.api_url, e))
        })?;

        Ok(Self {
            lifecycle: LifecycleOptions::default(),
            storage,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            slurm: SlurmControllerOptions {
                default_reason: settings.slurm.default_reason.clone(),
            },
            salt: SaltApiOptions {
                enabled: settings.salt.enabled,
                api_url,
                username: settings.salt.username.clone(),
                password: SecretString::from(settings.salt.password.clone()),
                eauth: settings.salt.eauth.clone(),
                timeout: Duration::from_secs(30),
            },
            tracker: TaskTrackerOptions {
                max_concurrent_hosts: settings.install.max_concurrent_hosts,
                removal_poll: PollOptions {
                    interval: Duration::from_secs(settings.slurm.removal_poll_interval_secs),
                    deadline: Duration::from_secs(settings.slurm.removal_timeout_secs),
                },
                salt_master_address: settings.salt.master_address.clone(),
                salt_repo_url: settings.install.salt_repo_url.clone(),
            },
            step_runner: StepRunnerOptions {
                connect_timeout: Duration::from_secs(settings.install.connect_timeout_secs),
                command_timeout: Duration::from_secs(settings.install.command_timeout_secs),
            },
            reconciler: ReconcilerOptions {
                grace_window: Duration::from_secs(settings.workers.scheduler_grace_secs),
            },
            enable_reconciler: settings.workers.enable_reconciler,
            enable_history_sync: settings.workers.enable_history_sync,
            reconciler_worker: reconciler::Options {
                interval: Duration::from_secs(settings.workers.reconcile_interval_secs),
                ..Default::default()
            },
            history_sync_worker: history_sync::Options {
                interval: Duration::from_secs(settings.workers.history_sync_interval_secs),
            },
        })
    }
}

/// Lifecycle options for the daemon
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
