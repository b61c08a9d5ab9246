//! Utility functions and helpers
//!
//! This module contains logging bootstrap and time formatting helpers.

pub mod logging;
pub mod time;

pub use logging::{init_tracing, LOG_ENV};
pub use time::format_uptime;
