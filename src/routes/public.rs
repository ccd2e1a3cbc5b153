use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Page-level routes answered by the gateway itself.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // No landing page yet: redirect to /dashboard with a session, /login without.
        .route("/", get(handlers::home))
        // GET /health
        // Monitoring and load balancer checks.
        .route("/health", get(|| async { "ok" }))
}
