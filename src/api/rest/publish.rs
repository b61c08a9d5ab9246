//! Publish endpoint - the submission gateway

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::api::state::AppState;
use crate::types::Event;

/// Body of POST /publish: a single event or an array of events
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PublishRequest {
    Batch(Vec<Event>),
    Single(Event),
}

impl PublishRequest {
    pub fn into_events(self) -> Vec<Event> {
        match self {
            PublishRequest::Batch(events) => events,
            PublishRequest::Single(event) => vec![event],
        }
    }
}

/// Response for POST /publish
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: String,
    pub ingested_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_count: Option<usize>,
}

/// Structural checks serde can't express
///
/// The whole batch is validated before anything is queued.
pub fn validate_events(events: &[Event]) -> Result<(), ApiError> {
    for (index, event) in events.iter().enumerate() {
        if event.topic.trim().is_empty() {
            return Err(ApiError::validation(format!("event[{}]: topic must not be empty", index)));
        }
        if event.event_id.trim().is_empty() {
            return Err(ApiError::validation(format!("event[{}]: eventId must not be empty", index)));
        }
        if !event.payload.is_object() {
            return Err(ApiError::validation(format!("event[{}]: payload must be an object", index)));
        }
    }
    Ok(())
}

/// POST /publish - Validate and enqueue events
///
/// Returns as soon as the events are queued; persistence happens in the
/// background worker.
pub async fn publish_events(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return ApiError {
                status: rejection.status(),
                error: rejection.body_text(),
                code: "VALIDATION_ERROR".to_string(),
            }
            .into_response();
        }
    };

    let events = request.into_events();
    if let Err(e) = validate_events(&events) {
        return e.into_response();
    }

    let report = state.pipeline.submit(events);

    if report.is_complete() {
        let response = PublishResponse {
            status: "ok".to_string(),
            ingested_count: report.accepted,
            rejected_count: None,
        };
        (StatusCode::OK, Json(response)).into_response()
    } else {
        let response = PublishResponse {
            status: "partial".to_string(),
            ingested_count: report.accepted,
            rejected_count: Some(report.rejected),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response()
    }
}
