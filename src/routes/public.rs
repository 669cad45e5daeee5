use crate::AppState;
use axum::{Router, routing::get};

/// Public Router Module
///
/// Unauthenticated endpoints. Only liveness lives here: every enrollment read is
/// personal or staff-only.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Load balancer and monitoring probe.
        .route("/health", get(|| async { "ok" }))
}
