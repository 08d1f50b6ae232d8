use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    entitlements::service::EntitlementService,
    types::{CallerIdentity, Subscription},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiToolAccess {
    pub has_access: bool,
    pub accessible_tools: Vec<String>,
    pub inaccessible_tools: Vec<String>,
    pub subscriptions: Vec<Subscription>,
}

impl MultiToolAccess {
    fn denied_all(tool_slugs: &[String]) -> Self {
        Self {
            has_access: false,
            accessible_tools: Vec::new(),
            inaccessible_tools: tool_slugs.to_vec(),
            subscriptions: Vec::new(),
        }
    }
}

/// Checks several tools at once. Calls run concurrently, so latency tracks
/// the slowest check.
#[derive(Clone)]
pub struct MultiToolAggregator {
    service: EntitlementService,
}

impl MultiToolAggregator {
    pub fn new(service: EntitlementService) -> Self {
        Self { service }
    }

    pub async fn check(
        &self,
        identity: Option<&CallerIdentity>,
        tool_slugs: &[String],
        require_all: bool,
    ) -> MultiToolAccess {
        let Some(identity) = identity else {
            return MultiToolAccess::denied_all(tool_slugs);
        };

        let checks = tool_slugs.iter().map(|slug| async move {
            let outcome = self.service.check_access(&identity.id, slug).await;
            (slug, outcome)
        });

        let mut access = MultiToolAccess {
            has_access: false,
            accessible_tools: Vec::new(),
            inaccessible_tools: Vec::new(),
            subscriptions: Vec::new(),
        };

        for (slug, outcome) in join_all(checks).await {
            match outcome {
                Ok(decision) if decision.has_access => {
                    access.accessible_tools.push(slug.clone());
                    access.subscriptions.extend(decision.subscription);
                }
                Ok(_) => access.inaccessible_tools.push(slug.clone()),
                Err(e) => {
                    warn!(tool = %slug, error = %e, "Tool check failed, marking inaccessible");
                    access.inaccessible_tools.push(slug.clone());
                }
            }
        }

        access.has_access = if require_all {
            access.inaccessible_tools.is_empty()
        } else {
            !access.accessible_tools.is_empty()
        };

        access
    }
}
