//! Route guard: decides whether a request for a tool page may proceed or
//! must be redirected, before any page logic runs.
//!
//! Unprotected paths are passed through without touching the store. For a
//! protected path the guard resolves the caller, runs one access check and
//! either forwards the subscription or redirects with a stable error code.
//! Store failures are never retried here and always fail closed.

pub mod config;
pub mod middleware;

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    entitlements::EntitlementService,
    feedback::{FeedbackDispatcher, FeedbackParams, Scenario},
    metrics::METRICS,
    types::{AccessDecision, DenialReason, ErrorCode, Subscription},
    utils::logs_fmt::abbrev,
};

pub use config::{ErrorMessages, GuardConfig, RouteMatch};
pub use middleware::route_guard;

/// The `error` query value of a guard redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectError {
    AuthenticationRequired,
    NoSubscription,
    SubscriptionExpired,
    ToolInactive,
    SystemError,
}

impl RedirectError {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectError::AuthenticationRequired => "authentication_required",
            RedirectError::NoSubscription => "no_subscription",
            RedirectError::SubscriptionExpired => "subscription_expired",
            RedirectError::ToolInactive => "tool_inactive",
            RedirectError::SystemError => "system_error",
        }
    }

    fn error_code(&self) -> ErrorCode {
        match self {
            RedirectError::AuthenticationRequired => ErrorCode::AuthError,
            RedirectError::NoSubscription => ErrorCode::NoSubscription,
            RedirectError::SubscriptionExpired => ErrorCode::Expired,
            RedirectError::ToolInactive => ErrorCode::Inactive,
            RedirectError::SystemError => ErrorCode::SystemError,
        }
    }
}

impl From<DenialReason> for RedirectError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::NoSubscription => RedirectError::NoSubscription,
            DenialReason::Expired => RedirectError::SubscriptionExpired,
            DenialReason::ToolInactive => RedirectError::ToolInactive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    pub error: RedirectError,
    /// Query parameters in emission order, values not yet encoded.
    pub query: Vec<(&'static str, String)>,
}

impl Redirect {
    fn new(path: &str, error: RedirectError) -> Self {
        Self {
            path: path.to_string(),
            error,
            query: Vec::new(),
        }
    }

    fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `path?k=v&...` with every value percent-encoded.
    pub fn location(&self) -> String {
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        if query.is_empty() {
            return self.path.clone();
        }
        let sep = if self.path.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.path, sep, query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Proceed. Carries the subscription when a protected check granted access.
    Continue { subscription: Option<Subscription> },
    Redirect(Redirect),
}

impl GuardOutcome {
    pub fn allow(&self) -> bool {
        matches!(self, GuardOutcome::Continue { .. })
    }

    fn pass() -> Self {
        GuardOutcome::Continue { subscription: None }
    }
}

pub struct RouteGuard {
    config: GuardConfig,
    service: EntitlementService,
    dispatcher: Option<Arc<FeedbackDispatcher>>,
}

impl RouteGuard {
    pub fn new(config: GuardConfig, service: EntitlementService) -> Self {
        Self {
            config,
            service,
            dispatcher: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<FeedbackDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    #[instrument(skip(self, headers))]
    pub async fn guard(&self, path: &str, headers: &HeaderMap) -> GuardOutcome {
        let tool_slug = match self.config.route_for(path) {
            RouteMatch::Unprotected => return GuardOutcome::pass(),
            RouteMatch::Unmapped(route) => {
                error!(route, "Protected route has no tool slug, letting request through");
                return GuardOutcome::pass();
            }
            RouteMatch::Tool(slug) => slug,
        };

        let _timer = METRICS.guard_duration.start_timer();
        let outcome = self.check(path, tool_slug, headers).await;

        match &outcome {
            GuardOutcome::Continue { .. } => METRICS.guard_allowed.inc(),
            GuardOutcome::Redirect(r) => METRICS
                .guard_redirected
                .with_label_values(&[r.error.as_str()])
                .inc(),
        }
        outcome
    }

    async fn check(&self, path: &str, tool_slug: &str, headers: &HeaderMap) -> GuardOutcome {
        let identity = match self.service.store().caller_identity(headers).await {
            Ok(identity) => identity,
            Err(e) => {
                METRICS.record_store_error(e.is_transient());
                error!(tool = %tool_slug, error = %e, "Caller identity lookup failed");
                return self.system_error(tool_slug);
            }
        };

        let Some(identity) = identity else {
            info!(tool = %tool_slug, "Unauthenticated request to protected route");
            let mut redirect = Redirect::new(
                &self.config.login_redirect,
                RedirectError::AuthenticationRequired,
            )
            .param("redirectTo", path)
            .param("error", RedirectError::AuthenticationRequired.as_str());
            if self.config.include_error_details {
                redirect = redirect.param(
                    "message",
                    self.config.error_messages.authentication_required.clone(),
                );
            }
            self.notify_denied(RedirectError::AuthenticationRequired, tool_slug, None);
            return GuardOutcome::Redirect(redirect);
        };

        let decision = match self.service.check_access(&identity.id, tool_slug).await {
            Ok(decision) => decision,
            Err(e) => {
                METRICS.record_store_error(e.is_transient());
                error!(
                    user = %abbrev(&identity.id),
                    tool = %tool_slug,
                    error = %e,
                    "Access check failed"
                );
                return self.system_error(tool_slug);
            }
        };

        if decision.has_access {
            debug!(user = %abbrev(&identity.id), tool = %tool_slug, "Access granted");
            return GuardOutcome::Continue {
                subscription: decision.subscription,
            };
        }

        warn!(
            user = %abbrev(&identity.id),
            tool = %tool_slug,
            reason = ?decision.reason,
            "Access denied"
        );
        GuardOutcome::Redirect(self.denied(tool_slug, &decision))
    }

    fn denied(&self, tool_slug: &str, decision: &AccessDecision) -> Redirect {
        let kind = decision
            .denial()
            .map(RedirectError::from)
            .unwrap_or(RedirectError::NoSubscription);

        let mut redirect = Redirect::new(&self.config.unauthorized_redirect, kind)
            .param("error", kind.as_str())
            .param("tool", tool_slug);

        if self.config.include_error_details {
            let messages = &self.config.error_messages;
            let message = match kind {
                RedirectError::NoSubscription => &messages.no_subscription,
                RedirectError::SubscriptionExpired => &messages.expired,
                RedirectError::ToolInactive => &messages.tool_inactive,
                _ => &messages.access_denied,
            };
            let reason = decision.reason.as_deref().unwrap_or("Access denied");
            redirect = redirect
                .param("reason", reason)
                .param("message", message.clone());
        }

        self.notify_denied(kind, tool_slug, decision.subscription.as_ref());
        redirect
    }

    fn system_error(&self, tool_slug: &str) -> GuardOutcome {
        let mut redirect = Redirect::new(&self.config.unauthorized_redirect, RedirectError::SystemError)
            .param("error", RedirectError::SystemError.as_str())
            .param("tool", tool_slug);
        if self.config.include_error_details {
            redirect = redirect.param("message", self.config.error_messages.system_error.clone());
        }
        self.notify_denied(RedirectError::SystemError, tool_slug, None);
        GuardOutcome::Redirect(redirect)
    }

    fn notify_denied(&self, kind: RedirectError, tool_slug: &str, snapshot: Option<&Subscription>) {
        if let Some(dispatcher) = &self.dispatcher {
            let tool_name = snapshot.map_or(tool_slug, |s| s.tool.name.as_str());
            dispatcher.notify(
                Scenario::AccessDenied(kind.error_code()),
                &FeedbackParams::new(tool_name),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feedback::{ChannelSink, FeedbackConfig},
        store::{MemoryStore, StoreError},
        types::{SubscriptionStatus, Tool},
        utils::clock::ManualClock,
    };
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    const ROUTE: &str = "/app/invoice-reconciler";

    fn sub(status: SubscriptionStatus) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id: "alice".into(),
            tool: Tool {
                id: Uuid::new_v4(),
                slug: "invoice-reconciler".into(),
                name: "Invoice Reconciler".into(),
                active: true,
            },
            status,
            started_at: Utc::now() - Duration::days(3),
            expires_at: None,
            trial_ends_at: None,
        }
    }

    fn guard_with(store: Arc<MemoryStore>, config: GuardConfig) -> RouteGuard {
        let service = EntitlementService::new(store, Arc::new(ManualClock::new(Utc::now())));
        RouteGuard::new(config.with_route(ROUTE, "invoice-reconciler"), service)
    }

    fn alice() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("alice"));
        headers
    }

    fn redirect(outcome: GuardOutcome) -> Redirect {
        match outcome {
            GuardOutcome::Redirect(r) => r,
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unprotected_paths_never_reach_the_store() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        let guard = guard_with(store.clone(), GuardConfig::default());

        for path in ["/", "/app", "/app/invoice-reconciler-v2", "/pricing"] {
            assert!(guard.guard(path, &alice()).await.allow());
        }
        assert_eq!(store.identity_calls(), 0);
        assert_eq!(store.subscription_calls(), 0);
    }

    #[tokio::test]
    async fn unmapped_route_fails_open() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        let guard = guard_with(store.clone(), GuardConfig::default().with_route("/app/legacy", " "));
        assert!(guard.guard("/app/legacy/page", &HeaderMap::new()).await.allow());
        assert_eq!(store.identity_calls(), 0);
    }

    #[tokio::test]
    async fn anonymous_caller_is_sent_to_login_with_return_path() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        let guard = guard_with(store, GuardConfig::default());
        let path = "/app/invoice-reconciler/runs/2024 Q1/ä&b=c";

        let r = redirect(guard.guard(path, &HeaderMap::new()).await);
        assert_eq!(r.path, "/auth/login");
        assert_eq!(r.error, RedirectError::AuthenticationRequired);
        assert_eq!(r.get("message"), Some("Please log in to access this tool"));

        let location = r.location();
        let encoded = location
            .split(['?', '&'])
            .find_map(|kv| kv.strip_prefix("redirectTo="))
            .unwrap();
        assert_eq!(urlencoding::decode(encoded).unwrap(), path);
    }

    #[tokio::test]
    async fn granted_request_carries_subscription() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        store.insert(sub(SubscriptionStatus::Trial));
        let guard = guard_with(store, GuardConfig::default());

        match guard.guard("/app/invoice-reconciler/runs", &alice()).await {
            GuardOutcome::Continue { subscription: Some(s) } => {
                assert_eq!(s.status, SubscriptionStatus::Trial)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn denials_map_to_stable_codes() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        let guard = guard_with(store.clone(), GuardConfig::default());

        let r = redirect(guard.guard(ROUTE, &alice()).await);
        assert_eq!((r.path.as_str(), r.get("error")), ("/app", Some("no_subscription")));
        assert_eq!(r.get("tool"), Some("invoice-reconciler"));
        assert_eq!(r.get("reason"), Some("No active subscription found"));
        assert_eq!(r.get("message"), Some("This tool requires an active subscription"));

        let mut lapsed = sub(SubscriptionStatus::Active);
        lapsed.expires_at = Some(Utc::now() - Duration::hours(1));
        store.insert(lapsed);
        let r = redirect(guard.guard(ROUTE, &alice()).await);
        assert_eq!(r.get("error"), Some("subscription_expired"));

        let mut retired = sub(SubscriptionStatus::Active);
        retired.tool.active = false;
        store.insert(retired);
        let r = redirect(guard.guard(ROUTE, &alice()).await);
        assert_eq!(r.get("error"), Some("tool_inactive"));
        assert_eq!(r.get("message"), Some("This tool is currently unavailable"));
    }

    #[tokio::test]
    async fn details_are_omitted_when_disabled() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        let config = GuardConfig {
            include_error_details: false,
            ..GuardConfig::default()
        };
        let guard = guard_with(store, config);

        let r = redirect(guard.guard(ROUTE, &alice()).await);
        assert_eq!(r.get("error"), Some("no_subscription"));
        assert_eq!(r.get("reason"), None);
        assert_eq!(r.get("message"), None);

        let r = redirect(guard.guard(ROUTE, &HeaderMap::new()).await);
        assert_eq!(r.get("message"), None);
        assert_eq!(r.get("redirectTo"), Some(ROUTE));
    }

    #[tokio::test]
    async fn store_failure_fails_closed_without_retry() {
        let store = Arc::new(MemoryStore::new("x-user-id"));
        store.fail_tool("invoice-reconciler", StoreError::Timeout);
        let (sink, mut rx) = ChannelSink::new();
        let guard = guard_with(store.clone(), GuardConfig::default())
            .with_dispatcher(Arc::new(FeedbackDispatcher::new(FeedbackConfig::default(), Arc::new(sink))));

        let r = redirect(guard.guard(ROUTE, &alice()).await);
        assert_eq!(r.get("error"), Some("system_error"));
        assert_eq!(r.get("message"), Some("Unable to verify subscription access"));
        assert_eq!(store.subscription_calls(), 1);
        assert_eq!(rx.try_recv().unwrap().title, "Verification Failed");
    }

    #[test]
    fn location_appends_to_existing_query() {
        let r = Redirect::new("/app?tab=tools", RedirectError::NoSubscription)
            .param("error", "no_subscription");
        assert_eq!(r.location(), "/app?tab=tools&error=no_subscription");
        assert_eq!(Redirect::new("/app", RedirectError::NoSubscription).location(), "/app");
    }
}
