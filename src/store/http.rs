use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use reqwest::Client;
use std::time::Duration;
use tracing::{error, warn};

use crate::{
    store::{EntitlementStore, StoreError},
    types::{CallerIdentity, Subscription},
};

/// REST client for the external persistence/auth service.
pub struct HttpEntitlementStore {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpEntitlementStore {
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            // One bounded round trip per guarded request
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| StoreError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.client.get(url);
        match &self.api_key {
            Some(key) => req.header("apikey", key),
            None => req,
        }
    }

    /// `absent` lists the statuses that mean "nothing there" rather than a failure.
    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        absent: &[StatusCode],
    ) -> Result<Option<T>, StoreError> {
        let resp = req.send().await.map_err(|e| {
            error!(error = %e, "Entitlement store unreachable");
            StoreError::from(e)
        })?;

        match resp.status() {
            s if absent.contains(&s) => return Ok(None),
            s if !s.is_success() => {
                warn!(status = %s, "Entitlement store returned non-2xx");
                return Err(StoreError::Api(s.as_u16()));
            }
            _ => {}
        }

        resp.json::<Option<T>>().await.map_err(|e| {
            error!(error = %e, "Failed to parse entitlement store response");
            StoreError::Parse(e.to_string())
        })
    }
}

#[async_trait]
impl EntitlementStore for HttpEntitlementStore {
    async fn get_subscription(
        &self,
        user_id: &str,
        tool_slug: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let url = format!(
            "{}/subscriptions/{}/{}",
            self.api_url,
            urlencoding::encode(user_id),
            urlencoding::encode(tool_slug)
        );
        self.fetch(self.get(&url), &[StatusCode::NOT_FOUND]).await
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError> {
        let url = format!(
            "{}/subscriptions/{}",
            self.api_url,
            urlencoding::encode(user_id)
        );
        Ok(self
            .fetch(self.get(&url), &[StatusCode::NOT_FOUND])
            .await?
            .unwrap_or_default())
    }

    async fn caller_identity(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<CallerIdentity>, StoreError> {
        // No credentials, nothing to ask the auth service about.
        let Some(auth) = headers.get(AUTHORIZATION) else {
            return Ok(None);
        };

        // A rejected session is an anonymous caller; a rejected service key on
        // data lookups is a store failure.
        let url = format!("{}/auth/user", self.api_url);
        self.fetch(
            self.get(&url).header(AUTHORIZATION, auth.clone()),
            &[StatusCode::NOT_FOUND, StatusCode::UNAUTHORIZED],
        )
        .await
    }
}
