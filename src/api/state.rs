//! Shared application state for HTTP handlers

use crate::pipeline::Pipeline;

/// State handed to every handler
pub struct AppState {
    /// The running ingestion pipeline
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}
