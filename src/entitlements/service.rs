use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    entitlements::resolver::resolve_subscription,
    store::{EntitlementStore, StoreError},
    types::{AccessDecision, Subscription},
    utils::{clock::Clock, logs_fmt::abbrev},
};

/// Store lookups run through the resolver at the clock's current time.
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn EntitlementStore>,
    clock: Arc<dyn Clock>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn EntitlementStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn EntitlementStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// One store round trip, then the resolver. Store errors are returned as-is.
    #[instrument(skip(self), fields(user = %abbrev(user_id)))]
    pub async fn check_access(
        &self,
        user_id: &str,
        tool_slug: &str,
    ) -> Result<AccessDecision, StoreError> {
        let subscription = self.store.get_subscription(user_id, tool_slug).await?;
        let decision = resolve_subscription(subscription.as_ref(), self.clock.now());

        debug!(
            has_access = decision.has_access,
            reason = ?decision.reason,
            "Access check resolved"
        );

        Ok(decision)
    }

    /// Every subscription of the user that currently grants access.
    pub async fn active_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .store
            .list_subscriptions(user_id)
            .await?
            .into_iter()
            .filter(|s| resolve_subscription(Some(s), now).has_access)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::MemoryStore,
        types::{DenialReason, SubscriptionStatus, Tool},
        utils::clock::ManualClock,
    };
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn sub(slug: &str, status: SubscriptionStatus) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id: "alice".into(),
            tool: Tool {
                id: Uuid::new_v4(),
                slug: slug.into(),
                name: slug.into(),
                active: true,
            },
            status,
            started_at: Utc::now() - Duration::days(30),
            expires_at: None,
            trial_ends_at: None,
        }
    }

    #[tokio::test]
    async fn check_access_resolves_at_clock_time() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let mut s = sub("invoice-reconciler", SubscriptionStatus::Active);
        s.expires_at = Some(clock.now() + Duration::days(1));
        store.insert(s);

        let service = EntitlementService::new(store.clone(), clock.clone());
        assert!(service.check_access("alice", "invoice-reconciler").await.unwrap().has_access);

        clock.advance(Duration::days(2));
        let decision = service.check_access("alice", "invoice-reconciler").await.unwrap();
        assert_eq!(decision.code, Some(DenialReason::Expired));
        assert_eq!(store.subscription_calls(), 2);
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        store.set_outage(Some(StoreError::Timeout));
        let service = EntitlementService::new(store, Arc::new(ManualClock::new(Utc::now())));
        assert_eq!(
            service.check_access("alice", "invoice-reconciler").await,
            Err(StoreError::Timeout)
        );
    }

    #[tokio::test]
    async fn active_subscriptions_filters_denied() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        let now = Utc::now();

        store.insert(sub("invoice-reconciler", SubscriptionStatus::Active));
        let mut lapsed = sub("awb-extractor", SubscriptionStatus::Trial);
        lapsed.trial_ends_at = Some(now - Duration::days(1));
        store.insert(lapsed);
        store.insert(sub("rate-checker", SubscriptionStatus::Inactive));

        let service = EntitlementService::new(store, Arc::new(ManualClock::new(now)));
        let active = service.active_subscriptions("alice").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tool.slug, "invoice-reconciler");
    }
}
