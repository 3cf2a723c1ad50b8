//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::ClusterError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{history_sync, reconciler};

/// Run the cluster control daemon
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ClusterError> {
    info!("Initializing clusterd...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(options.lifecycle.clone());

    // Initialize everything
    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start clusterd: {}", e);
        shutdown_manager.shutdown(&shutdown_tx).await?;
        return Err(e);
    }

    // Wait for the shutdown signal; the daemon is persistent.
    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    shutdown_manager.shutdown(&shutdown_tx).await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), ClusterError> {
    let app_state = Arc::new(AppState::init(options).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_server(
        options,
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    if options.enable_reconciler {
        init_reconciler_worker(
            options.reconciler_worker.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    if options.enable_history_sync {
        init_history_sync_worker(
            options.history_sync_worker.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(())
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ClusterError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(
        app_state.registry.clone(),
        app_state.tracker.clone(),
        app_state.slurm.clone(),
        app_state.salt.clone(),
        app_state.execute.clone(),
        app_state.history.clone(),
        app_state.reconciler.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

fn init_reconciler_worker(
    options: reconciler::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ClusterError> {
    info!("Initializing reconciler worker...");

    let service = app_state.reconciler.clone();

    let handle = tokio::spawn(async move {
        reconciler::run(
            &options,
            service,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_reconciler_worker_handle(handle)?;
    Ok(())
}

fn init_history_sync_worker(
    options: history_sync::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ClusterError> {
    info!("Initializing history sync worker...");

    let salt = app_state.salt.clone();
    let history = app_state.history.clone();

    let handle = tokio::spawn(async move {
        history_sync::run(
            &options,
            salt,
            history,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_history_sync_worker_handle(handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), ClusterError>>>,
    reconciler_worker_handle: Option<JoinHandle<()>>,
    history_sync_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(lifecycle_options: LifecycleOptions) -> Self {
        Self {
            lifecycle_options,
            app_state: None,
            server_handle: None,
            reconciler_worker_handle: None,
            history_sync_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), ClusterError> {
        if self.app_state.is_some() {
            return Err(ClusterError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ClusterError>>,
    ) -> Result<(), ClusterError> {
        if self.server_handle.is_some() {
            return Err(ClusterError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub fn with_reconciler_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
    ) -> Result<(), ClusterError> {
        if self.reconciler_worker_handle.is_some() {
            return Err(ClusterError::ShutdownError("reconciler_handle already set".to_string()));
        }
        self.reconciler_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_history_sync_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
    ) -> Result<(), ClusterError> {
        if self.history_sync_worker_handle.is_some() {
            return Err(ClusterError::ShutdownError("history_sync_handle already set".to_string()));
        }
        self.history_sync_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self, shutdown_tx: &broadcast::Sender<()>) -> Result<(), ClusterError> {
        let _ = shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ClusterError> {
        info!("Shutting down clusterd...");

        // 1. Reconciler worker
        if let Some(handle) = self.reconciler_worker_handle.take() {
            handle.await.map_err(|e| ClusterError::ShutdownError(e.to_string()))?;
        }

        // 2. History sync worker
        if let Some(handle) = self.history_sync_worker_handle.take() {
            handle.await.map_err(|e| ClusterError::ShutdownError(e.to_string()))?;
        }

        // 3. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| ClusterError::ShutdownError(e.to_string()))??;
        }

        // 4. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
