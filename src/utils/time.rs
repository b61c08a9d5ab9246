//! Time and duration utilities

use std::time::Duration;

/// Format an uptime the way the stats endpoint reports it, e.g. `"12.34 seconds"`
pub fn format_uptime(uptime: Duration) -> String {
    format!("{:.2} seconds", uptime.as_secs_f64())
}
