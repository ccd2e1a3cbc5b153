use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Request-scoped Identity ---

/// Session
///
/// The authenticated caller, as resolved by the session provider for one request.
/// It is never persisted or mutated by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// `auth.users.id` of the caller (the JWT `sub` claim).
    pub user_id: Uuid,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// MembershipInfo
///
/// The caller's organization link and that organization's onboarding flag, read
/// from `public.users` joined with `public.organizations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromRow)]
pub struct MembershipInfo {
    pub organization_id: Option<Uuid>,
    // NULL when the organization row is missing.
    pub onboarding_completed: Option<bool>,
}

impl MembershipInfo {
    pub fn new(organization_id: Option<Uuid>, onboarding_completed: bool) -> Self {
        Self {
            organization_id,
            onboarding_completed: Some(onboarding_completed),
        }
    }

    /// A user is onboarded only when they belong to an organization whose
    /// onboarding has been completed.
    pub fn is_onboarded(&self) -> bool {
        self.organization_id.is_some() && self.onboarding_completed.unwrap_or(false)
    }
}

// --- API Schemas ---

/// AccessQuery
///
/// Query parameters for `GET /api/access`.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct AccessQuery {
    /// The page path the client is about to navigate to.
    pub path: String,
}

/// AccessReport
///
/// What the gateway would do with a navigation to `path` for the current caller.
/// Lets client-side route guards mirror the edge decision without a page load.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct AccessReport {
    pub path: String,
    pub authenticated: bool,
    /// "allow" or "redirect".
    pub decision: String,
    /// Redirect target including the query string, present only for "redirect".
    pub location: Option<String>,
    /// Name of the rule that produced the decision.
    pub rule: String,
}
