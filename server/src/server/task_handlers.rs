//! Task polling handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::server::state::ServerState;
use crate::server::ApiError;

/// Task polling handler. Pure read against a snapshot; always returns a
/// well-formed task even when hosts failed.
pub async fn get_task_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.tracker.get_task(id).await?;
    Ok(Json(task))
}
