//! Entitlement store client: the lookups the resolver and guard depend on.
//!
//! The store is an external collaborator. Everything here is a thin client
//! over it; decisions are made in [`crate::entitlements`].

pub mod http;
pub mod memory;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::types::{CallerIdentity, Subscription};

pub use http::HttpEntitlementStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// The user's subscription to the tool with this slug, with the tool record embedded.
    async fn get_subscription(
        &self,
        user_id: &str,
        tool_slug: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Every subscription the user holds, whatever its status.
    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError>;

    /// Resolves the caller of an inbound request. `None` means unauthenticated.
    async fn caller_identity(&self, headers: &HeaderMap)
    -> Result<Option<CallerIdentity>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Entitlement store unreachable: {0}")]
    Unreachable(String),
    #[error("Entitlement store timed out")]
    Timeout,
    #[error("Entitlement store error: HTTP {0}")]
    Api(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Transport-level failures that a later attempt may not hit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unreachable(_) | StoreError::Timeout | StoreError::Api(502..=504)
        )
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            StoreError::Api(status.as_u16())
        } else {
            StoreError::Unreachable(err.to_string())
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            sqlx::Error::Io(e) => StoreError::Unreachable(e.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_transient() {
        assert!(StoreError::Timeout.is_transient());
        assert!(StoreError::Unreachable("connection refused".into()).is_transient());
        assert!(StoreError::Api(503).is_transient());
        assert!(!StoreError::Api(500).is_transient());
        assert!(!StoreError::Api(403).is_transient());
        assert!(!StoreError::Parse("eof".into()).is_transient());
        assert!(!StoreError::Database("syntax".into()).is_transient());
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert_eq!(StoreError::from(sqlx::Error::PoolTimedOut), StoreError::Timeout);
    }
}
