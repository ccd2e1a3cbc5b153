use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// API Router Module
///
/// Endpoints for the browser application. `/api` is on the exclusion list, so
/// these run without the gate in front of them and evaluate access themselves.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // GET /api/access?path=/dashboard
        // Reports allow/redirect for a path so client-side navigation can follow
        // the same rules as full page loads.
        .route("/api/access", get(handlers::access_report))
}
