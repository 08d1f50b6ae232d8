use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::subscription::Subscription;

pub const REASON_NO_SUBSCRIPTION: &str = "No active subscription found";
pub const REASON_TOOL_INACTIVE: &str = "Tool is currently inactive";
pub const REASON_EXPIRED: &str = "Subscription has expired";

/// Structured cause of a denial. Travels alongside the prose `reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NoSubscription,
    ToolInactive,
    Expired,
}

impl DenialReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenialReason::NoSubscription => REASON_NO_SUBSCRIPTION,
            DenialReason::ToolInactive => REASON_TOOL_INACTIVE,
            DenialReason::Expired => REASON_EXPIRED,
        }
    }

    /// Classifies free-form reason text from decisions that carry no structured code.
    pub fn from_reason_text(reason: &str) -> Self {
        let lowered = reason.to_ascii_lowercase();
        if lowered.contains("expired") {
            DenialReason::Expired
        } else if lowered.contains("inactive") {
            DenialReason::ToolInactive
        } else {
            DenialReason::NoSubscription
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub has_access: bool,
    pub reason: Option<String>,
    #[serde(default)]
    pub code: Option<DenialReason>,
    pub subscription: Option<Subscription>,
}

impl AccessDecision {
    pub fn granted(subscription: Subscription) -> Self {
        Self {
            has_access: true,
            reason: None,
            code: None,
            subscription: Some(subscription),
        }
    }

    pub fn denied(code: DenialReason, subscription: Option<Subscription>) -> Self {
        Self {
            has_access: false,
            reason: Some(code.message().to_string()),
            code: Some(code),
            subscription,
        }
    }

    /// The denial cause, preferring the structured code over the prose reason.
    pub fn denial(&self) -> Option<DenialReason> {
        if self.has_access {
            return None;
        }
        self.code.or_else(|| {
            Some(
                self.reason
                    .as_deref()
                    .map(DenialReason::from_reason_text)
                    .unwrap_or(DenialReason::NoSubscription),
            )
        })
    }
}

/// Closed classification of every way an access check can end without access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthError,
    NoSubscription,
    Expired,
    Inactive,
    NetworkError,
    SystemError,
}

impl ErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::NetworkError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::NoSubscription => "NO_SUBSCRIPTION",
            ErrorCode::Expired => "EXPIRED",
            ErrorCode::Inactive => "INACTIVE",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl From<DenialReason> for ErrorCode {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::NoSubscription => ErrorCode::NoSubscription,
            DenialReason::Expired => ErrorCode::Expired,
            DenialReason::ToolInactive => ErrorCode::Inactive,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
