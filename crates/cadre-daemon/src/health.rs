//! Liveness/health HTTP endpoint (§4.11): `GET /health` returns process
//! uptime and the time since the last successful tick, and answers 503 once
//! that gap exceeds the stall threshold.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

/// Ticks idle longer than this are considered stalled.
pub const STALL_THRESHOLD_SECS: i64 = 120;

pub struct HealthState {
    process: String,
    started_at: chrono::DateTime<Utc>,
    last_tick_unix: AtomicI64,
}

impl HealthState {
    pub fn new(process: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            process: process.into(),
            started_at: now,
            last_tick_unix: AtomicI64::new(now.timestamp()),
        }
    }

    pub fn record_tick(&self) {
        self.last_tick_unix.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    fn last_tick_seconds_ago(&self) -> i64 {
        Utc::now().timestamp() - self.last_tick_unix.load(Ordering::Relaxed)
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    process: String,
    uptime_seconds: i64,
    last_tick_seconds_ago: i64,
    memory_mb: f64,
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let last_tick_seconds_ago = state.last_tick_seconds_ago();
    let stalled = last_tick_seconds_ago > STALL_THRESHOLD_SECS;
    let body = HealthBody {
        status: if stalled { "stalled" } else { "ok" },
        process: state.process.clone(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        last_tick_seconds_ago,
        memory_mb: resident_memory_mb(),
    };
    let code = if stalled { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
    (code, Json(body))
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new().route("/health", get(health_handler)).with_state(state)
}

/// Resident set size in MiB, read from `/proc/self/status`. `0.0` when the
/// platform doesn't expose it (e.g. non-Linux, sandboxed test runners).
fn resident_memory_mb() -> f64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else { return 0.0 };
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: f64 = rest.trim().trim_end_matches(" kB").trim().parse().unwrap_or(0.0);
            return kb / 1024.0;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_not_stalled() {
        let state = HealthState::new("dispatcher");
        assert!(state.last_tick_seconds_ago() < STALL_THRESHOLD_SECS);
    }
}
