use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    store::StoreError,
    types::{Subscription, SubscriptionStatus, Tool},
};

/// One row of `user_tool_subscriptions` joined with its `tools` row.
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub tool_id: Uuid,
    pub tool_slug: String,
    pub tool_name: String,
    pub tool_status: String,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SubscriptionStatus>()
            .map_err(StoreError::Parse)?;

        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            tool: Tool {
                id: row.tool_id,
                slug: row.tool_slug,
                name: row.tool_name,
                active: row.tool_status.eq_ignore_ascii_case("active"),
            },
            status,
            started_at: row.started_at,
            expires_at: row.expires_at,
            trial_ends_at: row.trial_ends_at,
        })
    }
}
