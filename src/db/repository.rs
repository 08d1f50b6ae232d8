use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use sqlx::PgPool;

use crate::{
    db::models::SubscriptionRow,
    store::{EntitlementStore, StoreError},
    types::{CallerIdentity, Subscription},
};

const SUBSCRIPTION_COLUMNS: &str = r#"
    s.id, s.user_id, s.status, s.started_at, s.expires_at, s.trial_ends_at,
    t.id AS tool_id, t.slug AS tool_slug, t.name AS tool_name, t.status AS tool_status
"#;

/// Postgres-backed store. Callers are identified by a header that the
/// upstream auth proxy sets after verifying the session.
pub struct Repository {
    pool: Arc<PgPool>,
    identity_header: String,
}

impl Repository {
    pub fn new(pool: Arc<PgPool>, identity_header: impl Into<String>) -> Self {
        Self {
            pool,
            identity_header: identity_header.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntitlementStore for Repository {
    async fn get_subscription(
        &self,
        user_id: &str,
        tool_slug: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM user_tool_subscriptions s
            JOIN tools t ON t.id = s.tool_id
            WHERE s.user_id = $1 AND t.slug = $2
            ORDER BY s.started_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(tool_slug)
        .fetch_optional(self.pool())
        .await?;

        row.map(Subscription::try_from).transpose()
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM user_tool_subscriptions s
            JOIN tools t ON t.id = s.tool_id
            WHERE s.user_id = $1
            ORDER BY t.order_index ASC NULLS LAST, t.slug ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn caller_identity(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<CallerIdentity>, StoreError> {
        Ok(headers
            .get(self.identity_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(CallerIdentity::new))
    }
}
