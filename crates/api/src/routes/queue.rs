//! Read-only queue endpoint

use axum::{extract::State, Json};

use crate::error::ApiResult;
use crate::queue::QueueSnapshot;
use crate::state::AppState;

/// Current serving numbers and waiting count, same shape as `updateQueue`
pub async fn get_queue(State(state): State<AppState>) -> ApiResult<Json<QueueSnapshot>> {
    let snapshot = state.queue.snapshot().await?;
    Ok(Json(snapshot))
}
