use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::{
    store::{EntitlementStore, StoreError},
    types::{CallerIdentity, Subscription},
};

/// In-process store. Identity comes from a plain header, as if set by a trusted proxy.
pub struct MemoryStore {
    identity_header: String,
    subscriptions: RwLock<HashMap<(String, String), Subscription>>,
    failures: RwLock<HashMap<String, StoreError>>,
    outage: RwLock<Option<StoreError>>,
    latency: RwLock<Option<Duration>>,
    subscription_calls: AtomicUsize,
    identity_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(identity_header: impl Into<String>) -> Self {
        Self {
            identity_header: identity_header.into(),
            subscriptions: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            outage: RwLock::new(None),
            latency: RwLock::new(None),
            subscription_calls: AtomicUsize::new(0),
            identity_calls: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, subscription: Subscription) {
        let key = (subscription.user_id.clone(), subscription.tool.slug.clone());
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, subscription);
    }

    pub fn remove(&self, user_id: &str, tool_slug: &str) {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(user_id.to_string(), tool_slug.to_string()));
    }

    /// Every lookup for this tool fails with `err` until cleared.
    pub fn fail_tool(&self, tool_slug: &str, err: StoreError) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tool_slug.to_string(), err);
    }

    /// Every call fails with `err`; `None` restores service.
    pub fn set_outage(&self, err: Option<StoreError>) {
        *self.outage.write().unwrap_or_else(|e| e.into_inner()) = err;
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    pub fn subscription_calls(&self) -> usize {
        self.subscription_calls.load(Ordering::SeqCst)
    }

    pub fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    async fn simulate_round_trip(&self) -> Result<(), StoreError> {
        let latency = *self.latency.read().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.outage.read().unwrap_or_else(|e| e.into_inner()).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn get_subscription(
        &self,
        user_id: &str,
        tool_slug: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_round_trip().await?;

        if let Some(err) = self
            .failures
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tool_slug)
        {
            return Err(err.clone());
        }

        Ok(self
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(user_id.to_string(), tool_slug.to_string()))
            .cloned())
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_round_trip().await?;

        let mut subs: Vec<Subscription> = self
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.tool.slug.cmp(&b.tool.slug));
        Ok(subs)
    }

    async fn caller_identity(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<CallerIdentity>, StoreError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_round_trip().await?;

        Ok(headers
            .get(self.identity_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(CallerIdentity::new))
    }
}
