//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::ClusterError;
use crate::server::state::ServerState;
use crate::server::{salt_handlers, slurm_handlers, system_handlers, task_handlers};

/// Server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8070,
        }
    }
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ClusterError>>, ClusterError> {
    let app = Router::new()
        // Health and version
        .route("/health", get(system_handlers::health_handler))
        .route("/version", get(system_handlers::version_handler))
        .route("/api/system/metrics", get(system_handlers::metrics_handler))
        // Node lifecycle
        .route("/api/slurm/scale-up", post(slurm_handlers::scale_up_handler))
        .route("/api/slurm/scale-down", post(slurm_handlers::scale_down_handler))
        .route("/api/slurm/install", post(slurm_handlers::install_handler))
        .route("/api/slurm/nodes/manage", post(slurm_handlers::manage_nodes_handler))
        // Scheduler views
        .route("/api/slurm/nodes", get(slurm_handlers::nodes_handler))
        .route("/api/slurm/jobs", get(slurm_handlers::jobs_handler))
        .route("/api/slurm/partitions", get(slurm_handlers::partitions_handler))
        .route("/api/slurm/summary", get(slurm_handlers::summary_handler))
        // Task polling
        .route("/api/slurm/tasks/{id}", get(task_handlers::get_task_handler))
        // Config management
        .route("/api/saltstack/execute", post(salt_handlers::execute_handler))
        .route("/api/saltstack/jobs", get(salt_handlers::jobs_handler))
        .route("/api/saltstack/jobs/{jid}", get(salt_handlers::job_handler))
        .route("/api/saltstack/minions", get(salt_handlers::minions_handler))
        .route("/api/saltstack/status", get(salt_handlers::status_handler))
        .route("/api/saltstack/history", get(salt_handlers::history_handler))
        .route(
            "/api/slurm/saltstack/integration",
            get(salt_handlers::status_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ClusterError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ClusterError::ServerError(e.to_string()))
    });

    Ok(handle)
}
