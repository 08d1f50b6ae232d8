use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{backend::AppState, types::CallerIdentity, utils::error::ToolpassError};

/// The resolved caller of an API request; `None` when unauthenticated.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<CallerIdentity>);

impl Caller {
    pub fn require(&self) -> Result<&CallerIdentity, ToolpassError> {
        self.0
            .as_ref()
            .ok_or_else(|| ToolpassError::Unauthorized("Authentication required".into()))
    }
}

pub async fn identify(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ToolpassError> {
    let identity = state.service.store().caller_identity(req.headers()).await?;
    req.extensions_mut().insert(Caller(identity));
    Ok(next.run(req).await)
}
