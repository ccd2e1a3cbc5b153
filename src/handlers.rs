use crate::{
    AppState,
    access::{AccessRequest, AccessRouter, Evaluation},
    cookies,
    models::{AccessQuery, AccessReport},
    session::Credentials,
};
use axum::{
    Json,
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};

// --- Handlers ---

/// home
///
/// [Public Route] The landing page has no content of its own: callers with a
/// session go to the dashboard, everyone else to the login page.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 307, description = "Redirect to /dashboard or /login"))
)]
pub async fn home(State(router): State<AccessRouter>, headers: HeaderMap) -> Response {
    let credentials = Credentials::from_headers(&headers);
    let evaluation = router.entry(&credentials).await;
    let return_param = router.policy().return_param.clone();
    into_redirect(evaluation, &return_param)
}

/// access_report
///
/// [API Route] Reports the decision the gateway would take for a navigation to
/// `path` with the caller's current credentials. Cookie mutations from a token
/// refresh are applied to this response as well.
#[utoipa::path(
    get,
    path = "/api/access",
    params(AccessQuery),
    responses((status = 200, description = "Access decision", body = AccessReport))
)]
pub async fn access_report(
    State(router): State<AccessRouter>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
) -> Response {
    let request = AccessRequest {
        path: query.path.clone(),
        credentials: Credentials::from_headers(&headers),
    };
    let evaluation = router.evaluate(&request).await;

    let report = AccessReport {
        path: query.path,
        authenticated: evaluation.authenticated,
        decision: if evaluation.decision.is_allow() {
            "allow".to_string()
        } else {
            "redirect".to_string()
        },
        location: evaluation.decision.location(&router.policy().return_param),
        rule: evaluation.matched.to_string(),
    };

    cookies::apply_to_response(Json(report).into_response(), &evaluation.cookies)
}

/// forward
///
/// [Fallback] Hands every request the gateway does not serve itself to the page
/// application. By the time it runs, the access gate has already allowed it.
pub async fn forward(State(state): State<AppState>, request: Request) -> Response {
    match &state.upstream {
        Some(upstream) => upstream.forward(request).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Turns a redirect evaluation into the final 307 response, cookies included.
pub fn into_redirect(evaluation: Evaluation, return_param: &str) -> Response {
    let location = evaluation
        .decision
        .location(return_param)
        .unwrap_or_else(|| "/".to_string());
    cookies::apply_to_response(
        Redirect::temporary(&location).into_response(),
        &evaluation.cookies,
    )
}
