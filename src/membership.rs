use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::LookupError, models::MembershipInfo};

/// MembershipStore Trait
///
/// The directory contract used by the access router: given a user identity,
/// return the user's organization link and onboarding flag. A user without a
/// directory row has no organization.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn lookup_membership(&self, user_id: Uuid) -> Result<MembershipInfo, LookupError>;
}

/// MembershipState
///
/// The shared handle to the directory held in the application state.
pub type MembershipState = Arc<dyn MembershipStore>;

/// PostgresMembershipStore
///
/// Reads `public.users` and `public.organizations` through the shared connection pool.
pub struct PostgresMembershipStore {
    pool: PgPool,
}

impl PostgresMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for PostgresMembershipStore {
    /// lookup_membership
    ///
    /// LEFT JOIN so that a user whose organization row is gone still resolves,
    /// with a NULL onboarding flag (treated as not onboarded).
    async fn lookup_membership(&self, user_id: Uuid) -> Result<MembershipInfo, LookupError> {
        let row = sqlx::query_as::<_, MembershipInfo>(
            r#"
            SELECT u.organization_id, o.onboarding_completed
            FROM users u
            LEFT JOIN organizations o ON o.id = u.organization_id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("lookup_membership error: {:?}", e);
            LookupError::Database(e)
        })?;

        Ok(row.unwrap_or_default())
    }
}
