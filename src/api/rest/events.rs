//! Events endpoint - stored events by topic

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::ApiError;
use crate::api::state::AppState;
use crate::types::StoredEvent;

/// Query parameters for GET /events
#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub topic: String,
}

/// Response for GET /events
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub topic: String,
    pub count: usize,
    pub events: Vec<StoredEvent>,
}

/// GET /events?topic=<topic> - Stored events in insertion order
///
/// An unknown topic yields an empty list, not an error.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EventsParams>, QueryRejection>,
) -> Response {
    let Query(params) = match query {
        Ok(query) => query,
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };

    match state.pipeline.list_topic(&params.topic).await {
        Ok(events) => Json(EventsResponse {
            topic: params.topic,
            count: events.len(),
            events,
        })
        .into_response(),
        Err(e) => {
            error!(topic = %params.topic, error = %e, "Failed to list events");
            ApiError::internal(e.to_string()).into_response()
        }
    }
}
