use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    entitlements::effective_status,
    types::{AccessDecision, DenialReason, ErrorCode, Subscription, SubscriptionStatus},
    validator::checker::CheckError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ValidatorState {
    Idle,
    Validating,
    /// Waiting out the backoff after `attempt` failed network attempts.
    Retrying { attempt: u32 },
    Success,
    /// No further automatic validation until the validator is re-activated.
    Terminal(ErrorCode),
}

impl ValidatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ValidatorState::Terminal(_))
    }
}

/// What the validator last learned about the caller's access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Last completed round trip. `None` until one succeeds.
    pub decision: Option<AccessDecision>,
    pub last_validated: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error: Option<ErrorCode>,
    pub is_loading: bool,
}

impl ValidationResult {
    pub fn has_access(&self) -> bool {
        self.decision.as_ref().is_some_and(|d| d.has_access)
    }

    pub fn reason(&self) -> Option<&str> {
        self.decision.as_ref().and_then(|d| d.reason.as_deref())
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.decision.as_ref().and_then(|d| d.subscription.as_ref())
    }

    pub fn effective_status(&self) -> Option<SubscriptionStatus> {
        self.decision.as_ref().and_then(effective_status)
    }
}

/// `min(base * 2^(attempt-1), max)` for the attempt that just failed.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

/// Error code for a denial, in priority order: nothing on file, then
/// expiry, then inactivity.
pub fn classify_denial(decision: &AccessDecision) -> ErrorCode {
    let Some(subscription) = &decision.subscription else {
        return ErrorCode::NoSubscription;
    };
    let denial = decision.denial();

    if denial == Some(DenialReason::Expired) || subscription.status == SubscriptionStatus::Expired {
        ErrorCode::Expired
    } else if subscription.status == SubscriptionStatus::Inactive
        || denial == Some(DenialReason::ToolInactive)
    {
        ErrorCode::Inactive
    } else {
        ErrorCode::NoSubscription
    }
}

pub fn classify_failure(err: &CheckError) -> ErrorCode {
    match err {
        CheckError::Unauthenticated => ErrorCode::AuthError,
        CheckError::Store(e) if e.is_transient() => ErrorCode::NetworkError,
        CheckError::Store(_) => ErrorCode::SystemError,
    }
}
