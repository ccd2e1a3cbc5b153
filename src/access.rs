use axum::extract::FromRef;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    AppState,
    cookies::CookieMutation,
    error::{AccessError, LookupError, SessionError},
    membership::MembershipState,
    models::Session,
    paths::{PathClass, PrefixMatch, RequestPath},
    session::{Credentials, SessionResolution, SessionState},
};

/// AccessPolicy
///
/// The static route lists and redirect targets the rules work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Routes that require a session.
    pub protected: Vec<String>,
    /// Routes only meant for anonymous callers.
    pub auth: Vec<String>,
    /// Routes that additionally require completed onboarding.
    pub onboarding_gated: Vec<String>,
    pub login_path: String,
    pub dashboard_path: String,
    pub onboarding_path: String,
    /// Query parameter carrying the originally requested path to the login page.
    pub return_param: String,
    pub prefix_match: PrefixMatch,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            protected: vec![
                "/dashboard".to_string(),
                "/onboarding".to_string(),
                "/billing".to_string(),
            ],
            auth: vec!["/login".to_string(), "/signup".to_string()],
            onboarding_gated: vec!["/dashboard".to_string()],
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
            onboarding_path: "/onboarding".to_string(),
            return_param: "redirect".to_string(),
            prefix_match: PrefixMatch::Segment,
        }
    }
}

impl AccessPolicy {
    pub fn with_prefix_match(mut self, prefix_match: PrefixMatch) -> Self {
        self.prefix_match = prefix_match;
        self
    }

    /// Protected wins over auth; the lists do not overlap in practice. A path
    /// is in a class when either its decoded or its normalized form matches,
    /// so `/dashboard/..` stays protected.
    pub fn classify(&self, path: &RequestPath) -> PathClass {
        if self.matches_either(path, &self.protected) {
            PathClass::Protected
        } else if self.matches_either(path, &self.auth) {
            PathClass::Auth
        } else {
            PathClass::Unclassified
        }
    }

    fn matches_either(&self, path: &RequestPath, prefixes: &[String]) -> bool {
        self.prefix_match.matches_any(path.decoded(), prefixes)
            || self.prefix_match.matches_any(path.as_str(), prefixes)
    }

    fn is_onboarding_gated(&self, path: &RequestPath) -> bool {
        self.matches_either(path, &self.onboarding_gated)
    }

    /// The exemption from the onboarding redirect needs both forms to agree.
    fn is_onboarding(&self, path: &RequestPath) -> bool {
        self.prefix_match
            .matches(path.decoded(), &self.onboarding_path)
            && self.prefix_match.matches(path.as_str(), &self.onboarding_path)
    }
}

/// Decision
///
/// What happens to a request: it is forwarded unchanged, or the caller is sent
/// elsewhere. `return_to` becomes the `?redirect=` parameter of the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectTo {
        target: String,
        return_to: Option<String>,
    },
}

impl Decision {
    pub fn redirect(target: impl Into<String>) -> Self {
        Decision::RedirectTo {
            target: target.into(),
            return_to: None,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// The `Location` value for a redirect, with the return path form-encoded.
    pub fn location(&self, return_param: &str) -> Option<String> {
        match self {
            Decision::Allow => None,
            Decision::RedirectTo {
                target,
                return_to: None,
            } => Some(target.clone()),
            Decision::RedirectTo {
                target,
                return_to: Some(path),
            } => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair(return_param, path)
                    .finish();
                Some(format!("{}?{}", target, query))
            }
        }
    }
}

/// Rule
///
/// One entry of the decision table. Rules are tried in `RULES` order and the
/// first one that yields a decision wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Protected path without a session: go to login, remembering the path.
    RequireSession,
    /// Login/signup with a session: go to the dashboard.
    BounceAuthenticated,
    /// Dashboard with a session whose organization is not onboarded: go to onboarding.
    RequireOnboarding,
    /// Anything else is forwarded.
    Pass,
}

pub const RULES: [Rule; 4] = [
    Rule::RequireSession,
    Rule::BounceAuthenticated,
    Rule::RequireOnboarding,
    Rule::Pass,
];

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Rule::RequireSession => "require_session",
            Rule::BounceAuthenticated => "bounce_authenticated",
            Rule::RequireOnboarding => "require_onboarding",
            Rule::Pass => "pass",
        }
    }
}

/// Labels for decisions that are not produced by the rule table.
pub const ENTRY_POINT: &str = "entry_point";
pub const MALFORMED_PATH: &str = "malformed_path";

/// AccessRequest
///
/// The parts of an HTTP request the router looks at.
#[derive(Debug, Clone, Default)]
pub struct AccessRequest {
    pub path: String,
    pub credentials: Credentials,
}

/// Evaluation
///
/// The outcome of one evaluation: the decision, the cookie mutations that must
/// accompany it, and which rule decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub cookies: Vec<CookieMutation>,
    pub authenticated: bool,
    pub matched: &'static str,
}

struct Facts<'a> {
    path: &'a RequestPath,
    class: PathClass,
    session: Option<&'a Session>,
}

/// AccessRouter
///
/// Decides, per request, between forwarding and redirecting. It holds no state
/// across requests; the collaborators are shared read-only handles.
///
/// Failures are handled fail-closed: an unresolvable session counts as no
/// session, a failed membership lookup counts as incomplete onboarding, and a
/// malformed path is sent to the entry point for the caller's session state.
#[derive(Clone)]
pub struct AccessRouter {
    sessions: SessionState,
    memberships: MembershipState,
    policy: AccessPolicy,
    session_timeout: Duration,
    membership_timeout: Duration,
}

impl AccessRouter {
    pub fn new(sessions: SessionState, memberships: MembershipState, policy: AccessPolicy) -> Self {
        Self {
            sessions,
            memberships,
            policy,
            session_timeout: Duration::from_secs(2),
            membership_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeouts(mut self, session: Duration, membership: Duration) -> Self {
        self.session_timeout = session;
        self.membership_timeout = membership;
        self
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// evaluate
    ///
    /// Resolves the session once, classifies the path and runs the rule table.
    pub async fn evaluate(&self, request: &AccessRequest) -> Evaluation {
        let resolution = self.resolve_session(&request.credentials).await;

        let path = match RequestPath::parse(&request.path) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("{}; sending caller to the entry point", e);
                let mut evaluation = self.entry_decision(resolution);
                evaluation.matched = MALFORMED_PATH;
                return evaluation;
            }
        };

        let facts = Facts {
            path: &path,
            class: self.policy.classify(&path),
            session: resolution.session.as_ref(),
        };

        for rule in RULES {
            if let Some(decision) = self.apply(rule, &facts).await {
                tracing::debug!(
                    path = %path.as_str(),
                    rule = rule.as_str(),
                    allow = decision.is_allow(),
                    "access decision"
                );
                return Evaluation {
                    decision,
                    authenticated: resolution.session.is_some(),
                    cookies: resolution.cookies,
                    matched: rule.as_str(),
                };
            }
        }

        // `Rule::Pass` always decides; kept for exhaustiveness.
        Evaluation {
            decision: Decision::Allow,
            authenticated: resolution.session.is_some(),
            cookies: resolution.cookies,
            matched: Rule::Pass.as_str(),
        }
    }

    /// entry
    ///
    /// The home page decision: dashboard for a session, login otherwise.
    pub async fn entry(&self, credentials: &Credentials) -> Evaluation {
        let resolution = self.resolve_session(credentials).await;
        self.entry_decision(resolution)
    }

    fn entry_decision(&self, resolution: SessionResolution) -> Evaluation {
        let decision = match resolution.session {
            Some(_) => Decision::redirect(self.policy.dashboard_path.clone()),
            None => Decision::redirect(self.policy.login_path.clone()),
        };
        Evaluation {
            decision,
            authenticated: resolution.session.is_some(),
            cookies: resolution.cookies,
            matched: ENTRY_POINT,
        }
    }

    async fn apply(&self, rule: Rule, facts: &Facts<'_>) -> Option<Decision> {
        match rule {
            Rule::RequireSession => {
                (facts.class == PathClass::Protected && facts.session.is_none()).then(|| {
                    Decision::RedirectTo {
                        target: self.policy.login_path.clone(),
                        return_to: Some(facts.path.raw().to_string()),
                    }
                })
            }
            Rule::BounceAuthenticated => (facts.class == PathClass::Auth
                && facts.session.is_some())
            .then(|| Decision::redirect(self.policy.dashboard_path.clone())),
            Rule::RequireOnboarding => {
                let session = facts.session?;
                if !self.policy.is_onboarding_gated(facts.path)
                    || self.policy.is_onboarding(facts.path)
                {
                    return None;
                }
                if self.onboarding_complete(session.user_id).await {
                    return None;
                }
                Some(Decision::redirect(self.policy.onboarding_path.clone()))
            }
            Rule::Pass => Some(Decision::Allow),
        }
    }

    /// Session resolution with the timeout applied. Any failure resolves to
    /// "no session" and drops the provider's cookie mutations.
    pub async fn resolve_session(&self, credentials: &Credentials) -> SessionResolution {
        let outcome = match tokio::time::timeout(
            self.session_timeout,
            self.sessions.resolve(credentials),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        };

        match outcome {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!("{}; treating caller as anonymous", AccessError::from(e));
                SessionResolution::anonymous()
            }
        }
    }

    /// Membership lookup with the timeout applied. Any failure counts as not onboarded.
    async fn onboarding_complete(&self, user_id: Uuid) -> bool {
        let outcome = match tokio::time::timeout(
            self.membership_timeout,
            self.memberships.lookup_membership(user_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout),
        };

        match outcome {
            Ok(membership) => membership.is_onboarded(),
            Err(e) => {
                tracing::warn!(%user_id, "{}; treating onboarding as incomplete", AccessError::from(e));
                false
            }
        }
    }
}

impl FromRef<AppState> for AccessRouter {
    fn from_ref(state: &AppState) -> AccessRouter {
        AccessRouter::new(
            state.sessions.clone(),
            state.memberships.clone(),
            AccessPolicy::default().with_prefix_match(state.config.prefix_match),
        )
        .with_timeouts(state.config.session_timeout, state.config.membership_timeout)
    }
}
