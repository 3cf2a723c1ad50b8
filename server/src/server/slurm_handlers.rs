//! SLURM-facing request handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::NodeSpec;
use crate::server::state::ServerState;
use crate::server::ApiError;
use crate::slurm::{JobFilter, NodeAction};
use crate::tasks::tracker::InstallRequest;

fn default_true() -> bool {
    true
}

/// Scale-up request
#[derive(Debug, Deserialize)]
pub struct ScaleUpRequest {
    pub nodes: Vec<NodeSpec>,

    #[serde(default = "default_true")]
    pub install_saltstack: bool,

    #[serde(default = "default_true")]
    pub install_slurm: bool,
}

/// Task creation response
#[derive(Debug, Serialize)]
pub struct TaskCreatedResponse {
    pub task_id: Uuid,
}

/// Scale-up handler
pub async fn scale_up_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ScaleUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let install = InstallRequest {
        install_saltstack: request.install_saltstack,
        install_slurm: request.install_slurm,
    };
    let task_id = state.tracker.scale_up(request.nodes, install).await?;
    Ok((StatusCode::CREATED, Json(TaskCreatedResponse { task_id })))
}

/// Scale-down request
#[derive(Debug, Deserialize)]
pub struct ScaleDownRequest {
    pub node_names: Vec<String>,
}

/// Scale-down handler
pub async fn scale_down_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ScaleDownRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = state.tracker.scale_down(request.node_names).await?;
    Ok((StatusCode::CREATED, Json(TaskCreatedResponse { task_id })))
}

/// Install request (re-provision registered nodes)
#[derive(Debug, Deserialize)]
pub struct InstallNodesRequest {
    pub node_names: Vec<String>,

    #[serde(default = "default_true")]
    pub install_saltstack: bool,

    #[serde(default = "default_true")]
    pub install_slurm: bool,
}

/// Install handler
pub async fn install_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<InstallNodesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let install = InstallRequest {
        install_saltstack: request.install_saltstack,
        install_slurm: request.install_slurm,
    };
    let task_id = state.tracker.install(request.node_names, install).await?;
    Ok((StatusCode::CREATED, Json(TaskCreatedResponse { task_id })))
}

/// Node state management request
#[derive(Debug, Deserialize)]
pub struct ManageNodesRequest {
    pub node_names: Vec<String>,
    pub action: NodeAction,
    #[serde(default)]
    pub reason: String,
}

/// Node state management response
#[derive(Debug, Serialize)]
pub struct ManageNodesResponse {
    pub success: bool,
    pub message: String,
}

/// Node state management handler
pub async fn manage_nodes_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ManageNodesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .slurm
        .manage_nodes(&request.node_names, request.action, &request.reason)
        .await?;
    Ok(Json(ManageNodesResponse {
        success: true,
        message: format!(
            "{} applied to {} node(s)",
            request.action,
            request.node_names.len()
        ),
    }))
}

/// Merged node view handler
pub async fn nodes_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let views = state.reconciler.reconcile().await?;
    Ok(Json(views))
}

/// Job list handler
pub async fn jobs_handler(
    State(state): State<Arc<ServerState>>,
    Query(filter): Query<JobFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let jobs = state.slurm.list_jobs(&filter).await?;
    Ok(Json(jobs))
}

/// Partition list handler
pub async fn partitions_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let partitions = state.slurm.list_partitions().await?;
    Ok(Json(partitions))
}

/// Cluster summary response
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub total_nodes: usize,
    pub nodes_by_state: BTreeMap<String, usize>,
    pub nodes_needing_attention: usize,
    pub partitions: usize,
    pub jobs_running: usize,
    pub jobs_pending: usize,
}

/// Cluster summary handler
pub async fn summary_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let views = state.reconciler.reconcile().await?;
    let partitions = state.slurm.list_partitions().await.unwrap_or_default();
    let jobs = state
        .slurm
        .list_jobs(&JobFilter::default())
        .await
        .unwrap_or_default();

    let mut nodes_by_state: BTreeMap<String, usize> = BTreeMap::new();
    for view in &views {
        *nodes_by_state.entry(view.state.to_string()).or_insert(0) += 1;
    }

    Ok(Json(SummaryResponse {
        total_nodes: views.len(),
        nodes_by_state,
        nodes_needing_attention: views.iter().filter(|v| v.needs_attention).count(),
        partitions: partitions.len(),
        jobs_running: jobs.iter().filter(|j| j.state == "RUNNING").count(),
        jobs_pending: jobs.iter().filter(|j| j.state == "PENDING").count(),
    }))
}
