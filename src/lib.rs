use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod access;
pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod membership;
pub mod models;
pub mod paths;
pub mod proxy;
pub mod session;

pub mod routes;
use routes::{api, public};

use access::{AccessRequest, AccessRouter};
use paths::{PathClass, RequestPath};
use session::Credentials;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use membership::{MembershipState, PostgresMembershipStore};
pub use proxy::{UpstreamProxy, UpstreamState};
pub use session::{SessionState, SupabaseSessionProvider};

/// ApiDoc
///
/// OpenAPI document for the routes the gateway answers itself, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::home, handlers::access_report),
    components(schemas(models::AccessReport)),
    tags(
        (name = "ringr-gate", description = "Ringr access gateway")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container shared by every request: the two access
/// collaborators, the optional upstream and the loaded configuration.
#[derive(Clone)]
pub struct AppState {
    /// Resolves cookies to sessions (Supabase in production).
    pub sessions: SessionState,
    /// Organization and onboarding directory (Postgres).
    pub memberships: MembershipState,
    /// The page application allowed requests are forwarded to.
    pub upstream: Option<UpstreamState>,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for MembershipState {
    fn from_ref(app_state: &AppState) -> MembershipState {
        app_state.memberships.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// access_gate
///
/// The edge middleware. Excluded paths (assets, images, `/api`) go straight
/// through unless they classify as protected. Everything else is evaluated
/// once by the `AccessRouter`; a redirect
/// is answered here, an allowed request continues with its `Cookie` header
/// rewritten to match any refreshed session. Cookie mutations land on the final
/// response in a single pass either way.
async fn access_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let raw_path = request.uri().path().to_string();

    let router = AccessRouter::from_ref(&state);

    let excluded = RequestPath::parse(&raw_path)
        .map(|path| {
            state.config.exclusions.is_excluded(&path)
                && router.policy().classify(&path) != PathClass::Protected
        })
        .unwrap_or(false);
    if excluded {
        return next.run(request).await;
    }

    let access = AccessRequest {
        path: raw_path,
        credentials: Credentials::from_headers(request.headers()),
    };
    let evaluation = router.evaluate(&access).await;

    if evaluation.decision.is_allow() {
        cookies::rewrite_request_cookies(request.headers_mut(), &evaluation.cookies);
        let response = next.run(request).await;
        return cookies::apply_to_response(response, &evaluation.cookies);
    }

    tracing::info!(
        path = %access.path,
        rule = evaluation.matched,
        "redirecting request"
    );
    handlers::into_redirect(evaluation, &router.policy().return_param)
}

/// create_router
///
/// Assembles the routes, wraps them (fallback included) in the access gate and
/// adds the observability layers.
pub fn create_router(state: AppState) -> Router {
    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 1. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Swagger UI over the generated OpenAPI document.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: home redirect and health check.
        .merge(public::public_routes())
        // API Routes: excluded from the gate, they evaluate access themselves.
        .merge(api::api_routes())
        // Every other path belongs to the page application.
        .fallback(handlers::forward)
        // 2. Access Gate: `layer` (not `route_layer`) so the fallback is gated too.
        .layer(middleware::from_fn_with_state(state.clone(), access_gate))
        .with_state(state);

    // 3. Observability and Correlation Layers (outermost)
    base_router.layer(
        ServiceBuilder::new()
            // 3a. Request ID Generation: a UUID per incoming request.
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            // 3b. Request Tracing: span per request, tagged with the request ID.
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            // 3c. Request ID Propagation: echo x-request-id back to the client.
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the `x-request-id` so every log line
/// of one request (access decision included) can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
