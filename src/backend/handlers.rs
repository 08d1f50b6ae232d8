use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    backend::{AppState, middleware::Caller},
    db::health_check,
    feedback::{TimeRemaining, format_time_remaining, status_summary},
    types::Subscription,
    utils::{error::ToolpassError, logs_fmt::abbrev},
};

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    pub tool: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionList {
    pub subscriptions: Vec<Subscription>,
    pub total_count: usize,
}

/// `?tool=slug` answers one access check; without it, lists the caller's
/// currently usable subscriptions.
#[instrument(skip_all)]
pub async fn subscriptions_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<SubscriptionsQuery>,
) -> Result<Response, ToolpassError> {
    let identity = caller.require()?;

    match query.tool.as_deref().map(str::trim) {
        Some("") => Err(ToolpassError::InvalidRequest("tool must not be empty".into())),
        Some(slug) => {
            let decision = state.service.check_access(&identity.id, slug).await?;
            info!(
                user = %abbrev(&identity.id),
                tool = %slug,
                has_access = decision.has_access,
                "Access check"
            );
            Ok(Json(decision).into_response())
        }
        None => {
            let subscriptions = state.service.active_subscriptions(&identity.id).await?;
            Ok(Json(SubscriptionList {
                total_count: subscriptions.len(),
                subscriptions,
            })
            .into_response())
        }
    }
}

pub async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ToolpassError> {
    let identity = caller.require()?;
    let subscriptions = state.service.store().list_subscriptions(&identity.id).await?;
    Ok(Json(status_summary(&subscriptions, state.service.clock().now())))
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    /// Comma-separated tool slugs.
    pub tools: String,
    #[serde(default)]
    pub require_all: bool,
}

pub async fn access_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<AccessQuery>,
) -> impl IntoResponse {
    let slugs: Vec<String> = query
        .tools
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    Json(
        state
            .aggregator
            .check(caller.0.as_ref(), &slugs, query.require_all)
            .await,
    )
}

/// Landing page for guard redirects; echoes the notice it was sent with.
pub async fn app_index(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "page": "app",
        "error": params.get("error"),
        "tool": params.get("tool"),
        "message": params.get("message"),
    }))
}

#[derive(Debug, Serialize)]
pub struct ToolPage {
    pub path: String,
    pub tool: Option<String>,
    pub status: Option<String>,
    pub time_remaining: Option<TimeRemaining>,
}

/// Stand-in for a tool's page. The guard has already run; a granted check
/// leaves the subscription in the request extensions.
pub async fn tool_page(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    subscription: Option<Extension<Subscription>>,
) -> impl IntoResponse {
    let now = state.service.clock().now();
    let page = match subscription {
        Some(Extension(sub)) => ToolPage {
            path: format!("/app/{}", path),
            tool: Some(sub.tool.slug.clone()),
            status: Some(sub.status.to_string()),
            time_remaining: sub.governing_date().map(|at| format_time_remaining(at, now)),
        },
        None => ToolPage {
            path: format!("/app/{}", path),
            tool: None,
            status: None,
            time_remaining: None,
        },
    };
    Json(page)
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match &state.pool {
        Some(pool) => match health_check(pool).await {
            Ok(()) => Some(true),
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                Some(false)
            }
        },
        None => None,
    };

    let status = if database == Some(false) { "degraded" } else { "ok" };
    Json(serde_json::json!({
        "status": status,
        "database": database,
        "service": "toolpass",
    }))
}
