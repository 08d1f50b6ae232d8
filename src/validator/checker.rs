use async_trait::async_trait;

use crate::{
    entitlements::EntitlementService,
    store::StoreError,
    types::{AccessDecision, CallerIdentity},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("Caller is not authenticated")]
    Unauthenticated,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One access check on behalf of a single caller.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Whether the checker knows who it is asking for.
    fn has_identity(&self) -> bool;

    async fn check(&self, tool_slug: &str) -> Result<AccessDecision, CheckError>;
}

/// In-process checker backed by the entitlement service.
#[derive(Clone)]
pub struct LocalAccessChecker {
    service: EntitlementService,
    identity: Option<CallerIdentity>,
}

impl LocalAccessChecker {
    pub fn new(service: EntitlementService, identity: Option<CallerIdentity>) -> Self {
        Self { service, identity }
    }
}

#[async_trait]
impl AccessChecker for LocalAccessChecker {
    fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    async fn check(&self, tool_slug: &str) -> Result<AccessDecision, CheckError> {
        let identity = self.identity.as_ref().ok_or(CheckError::Unauthenticated)?;
        Ok(self.service.check_access(&identity.id, tool_slug).await?)
    }
}
