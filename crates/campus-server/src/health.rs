//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"draining"` once shutdown has begun.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered (authenticated) connections.
    pub connections: usize,
    /// Non-empty rooms.
    pub rooms: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, rooms: usize, draining: bool) -> HealthResponse {
    HealthResponse {
        status: if draining { "draining" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        rooms,
    }
}
