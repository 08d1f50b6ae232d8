use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::guard::{GuardOutcome, RouteGuard};

/// Runs the guard ahead of the wrapped routes. Granted requests see the
/// resolved `Subscription` as a request extension; everything else is
/// answered with a 307 to the redirect target.
pub async fn route_guard(
    State(guard): State<Arc<RouteGuard>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    match guard.guard(&path, req.headers()).await {
        GuardOutcome::Continue { subscription } => {
            if let Some(subscription) = subscription {
                req.extensions_mut().insert(subscription);
            }
            next.run(req).await
        }
        GuardOutcome::Redirect(redirect) => Redirect::temporary(&redirect.location()).into_response(),
    }
}
