//! The access decision itself. Pure: no I/O, no clock reads.

use chrono::{DateTime, Utc};

use crate::types::{AccessDecision, DenialReason, Subscription, SubscriptionStatus};

/// Decides whether `subscription` grants access at `now`.
///
/// Every denial except a missing subscription keeps the snapshot so callers
/// can tell an inactive or lapsed subscription from none at all.
///
/// Dates win over the stored status: a trial whose end date has passed is
/// expired even if the status column still reads `trial`.
pub fn resolve(
    subscription: Option<&Subscription>,
    tool_active: bool,
    now: DateTime<Utc>,
) -> AccessDecision {
    let Some(sub) = subscription else {
        return AccessDecision::denied(DenialReason::NoSubscription, None);
    };

    if !tool_active {
        return AccessDecision::denied(DenialReason::ToolInactive, Some(sub.clone()));
    }

    match sub.status {
        SubscriptionStatus::Expired | SubscriptionStatus::Inactive => {
            AccessDecision::denied(DenialReason::NoSubscription, Some(sub.clone()))
        }
        SubscriptionStatus::Active => match sub.expires_at {
            Some(exp) if exp < now => AccessDecision::denied(DenialReason::Expired, Some(sub.clone())),
            _ => AccessDecision::granted(sub.clone()),
        },
        SubscriptionStatus::Trial => match sub.trial_ends_at {
            Some(end) if end < now => AccessDecision::denied(DenialReason::Expired, Some(sub.clone())),
            _ => AccessDecision::granted(sub.clone()),
        },
    }
}

/// Convenience wrapper that reads the active flag from the embedded tool.
pub fn resolve_subscription(subscription: Option<&Subscription>, now: DateTime<Utc>) -> AccessDecision {
    let tool_active = subscription.is_some_and(|s| s.tool.active);
    resolve(subscription, tool_active, now)
}

/// The status the user actually experiences, after dates have been applied.
pub fn effective_status(decision: &AccessDecision) -> Option<SubscriptionStatus> {
    if decision.denial() == Some(DenialReason::Expired) {
        return Some(SubscriptionStatus::Expired);
    }
    decision.subscription.as_ref().map(|s| s.status)
}
