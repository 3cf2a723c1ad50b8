//! SaltStack-facing request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::server::state::ServerState;
use crate::server::ApiError;

/// Ad-hoc command request
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub target: String,
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Ad-hoc command response
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub jid: String,
}

/// Execute handler
pub async fn execute_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.target.trim().is_empty() || request.function.trim().is_empty() {
        return Err(ApiError(crate::errors::ClusterError::ValidationError(
            "target and function are required".to_string(),
        )));
    }
    let jid = state
        .execute
        .execute(&request.target, &request.function, request.args)
        .await?;
    Ok(Json(ExecuteResponse { jid }))
}

/// Salt job list handler
pub async fn jobs_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let jobs = state.salt.list_jobs().await?;
    Ok(Json(jobs))
}

/// Salt job lookup handler
pub async fn job_handler(
    State(state): State<Arc<ServerState>>,
    Path(jid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.salt.get_job(&jid).await?;
    Ok(Json(result))
}

/// Minion list handler
pub async fn minions_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let minions = state.salt.list_minions().await?;
    Ok(Json(minions))
}

/// Control plane status handler; 503 when the plane is unreachable
pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.salt.status().await?;
    Ok(Json(status))
}

/// Query for the history listing
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

/// Command history handler, most recent first
pub async fn history_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.history.query(query.limit).await;
    Ok(Json(rows))
}
