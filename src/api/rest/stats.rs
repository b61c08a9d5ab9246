//! Stats endpoint

use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::ApiError;
use crate::api::state::AppState;

/// GET /stats - Counters, uptime, topic count and queue depth
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.stats().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to collect stats");
            ApiError::internal(e.to_string()).into_response()
        }
    }
}
