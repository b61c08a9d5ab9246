//! API module for HTTP endpoints
//!
//! This module provides the submission gateway and the read endpoints on top
//! of the ingestion pipeline.

pub mod http;
pub mod rest;
pub mod state;

pub use http::create_router;
pub use state::AppState;
