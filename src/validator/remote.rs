use std::time::Duration;

use async_trait::async_trait;
use axum::http::{
    HeaderMap, HeaderName, HeaderValue, StatusCode,
    header::{AUTHORIZATION, InvalidHeaderValue},
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use crate::{
    entitlements::MultiToolAccess,
    store::StoreError,
    types::AccessDecision,
    validator::checker::{AccessChecker, CheckError},
};

/// Asks a running toolpass server for access over `GET /api/subscriptions?tool=`.
pub struct RemoteAccessClient {
    client: Client,
    base_url: String,
    credentials: HeaderMap,
}

impl RemoteAccessClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| StoreError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: HeaderMap::new(),
        })
    }

    pub fn with_bearer(mut self, token: &str) -> Result<Self, InvalidHeaderValue> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        self.credentials.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Sends a fixed header with every call, e.g. a trusted identity header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.credentials.insert(name, value);
        self
    }

    /// Several tools in one call through `GET /api/access`.
    pub async fn check_many(
        &self,
        tool_slugs: &[String],
        require_all: bool,
    ) -> Result<MultiToolAccess, CheckError> {
        let url = format!(
            "{}/api/access?tools={}&require_all={}",
            self.base_url,
            urlencoding::encode(&tool_slugs.join(",")),
            require_all
        );
        self.get_json(&url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CheckError> {
        let resp = self
            .client
            .get(url)
            .headers(self.credentials.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Access API unreachable");
                StoreError::from(e)
            })?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(CheckError::Unauthenticated),
            s if !s.is_success() => {
                warn!(status = %s, "Access API returned non-2xx");
                return Err(StoreError::Api(s.as_u16()).into());
            }
            _ => {}
        }

        resp.json::<T>().await.map_err(|e| {
            error!(error = %e, "Failed to parse access API response");
            CheckError::Store(StoreError::Parse(e.to_string()))
        })
    }
}

#[async_trait]
impl AccessChecker for RemoteAccessClient {
    fn has_identity(&self) -> bool {
        !self.credentials.is_empty()
    }

    async fn check(&self, tool_slug: &str) -> Result<AccessDecision, CheckError> {
        let url = format!(
            "{}/api/subscriptions?tool={}",
            self.base_url,
            urlencoding::encode(tool_slug)
        );
        self.get_json(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_follows_credentials() {
        let client = RemoteAccessClient::new("http://127.0.0.1:9/", Duration::from_millis(200)).unwrap();
        assert!(!client.has_identity());
        assert_eq!(client.base_url, "http://127.0.0.1:9");

        let client = client.with_bearer("token").unwrap();
        assert!(client.has_identity());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_failure() {
        let client = RemoteAccessClient::new("http://127.0.0.1:9", Duration::from_millis(500))
            .unwrap()
            .with_header(HeaderName::from_static("x-user-id"), HeaderValue::from_static("alice"));

        match client.check("invoice-reconciler").await {
            Err(CheckError::Store(e)) => assert!(e.is_transient()),
            other => panic!("expected transport failure, got {:?}", other),
        }
    }
}
