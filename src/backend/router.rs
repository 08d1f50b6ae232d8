use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::get,
};

use crate::{
    backend::{
        AppState,
        handlers::{
            access_handler, app_index, health_handler, subscriptions_handler, summary_handler,
            tool_page,
        },
        middleware::identify,
    },
    guard::route_guard,
    metrics::metrics_handler,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/subscriptions", get(subscriptions_handler))
        .route("/api/subscriptions/summary", get(summary_handler))
        .route("/api/access", get(access_handler))
        .route_layer(from_fn_with_state(state.clone(), identify));

    let pages = Router::new()
        .route("/app", get(app_index))
        .route("/app/*path", get(tool_page));

    // The guard sees every request; only configured tool routes are checked.
    Router::new()
        .merge(api)
        .merge(pages)
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(from_fn_with_state(state.guard.clone(), route_guard))
        .with_state(state)
}
