//! The notification table. Every scenario maps to exactly one message.

use std::time::Duration;

use serde::Serialize;

use crate::{
    feedback::FeedbackConfig,
    types::{ErrorCode, SubscriptionStatus},
};

pub const EXPIRING_SOON_DAYS: i64 = 7;
pub const TRIAL_ENDING_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Neutral,
    Info,
    Success,
    Warning,
    Destructive,
}

impl Severity {
    pub fn is_alert(&self) -> bool {
        matches!(self, Severity::Warning | Severity::Destructive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scenario {
    /// Current standing; `None` means the user holds no subscription.
    Status(Option<SubscriptionStatus>),
    Transition {
        from: Option<SubscriptionStatus>,
        to: SubscriptionStatus,
    },
    Retrying {
        attempt: u32,
        max_attempts: u32,
    },
    UnableToConnect,
    ConnectionRestored,
    Verified,
    AccessDenied(ErrorCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedbackParams {
    pub tool_name: String,
    pub days_remaining: Option<i64>,
}

impl FeedbackParams {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            days_remaining: None,
        }
    }

    pub fn with_days(mut self, days_remaining: Option<i64>) -> Self {
        self.days_remaining = days_remaining;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn days(n: i64) -> String {
    if n == 1 {
        "1 day".to_string()
    } else {
        format!("{} days", n)
    }
}

fn expiring_within(days_remaining: Option<i64>, threshold: i64) -> Option<i64> {
    days_remaining.filter(|d| *d > 0 && *d <= threshold)
}

pub fn render(scenario: &Scenario, params: &FeedbackParams, config: &FeedbackConfig) -> Feedback {
    let (title, description, severity) = entry(scenario, params);
    Feedback {
        title: title.to_string(),
        description,
        severity,
        duration: config.duration_for(severity),
    }
}

fn entry(scenario: &Scenario, params: &FeedbackParams) -> (&'static str, String, Severity) {
    use SubscriptionStatus::*;
    let tool = params.tool_name.as_str();

    match scenario {
        Scenario::Status(Some(Active)) => match expiring_within(params.days_remaining, EXPIRING_SOON_DAYS) {
            Some(d) => (
                "Subscription Expiring",
                format!(
                    "Your {} subscription expires in {}. Consider renewing to maintain access.",
                    tool,
                    days(d)
                ),
                Severity::Warning,
            ),
            None => (
                "Active Subscription",
                format!("You have full access to {}.", tool),
                Severity::Info,
            ),
        },
        Scenario::Status(Some(Trial)) => match expiring_within(params.days_remaining, TRIAL_ENDING_DAYS) {
            Some(d) => (
                "Trial Ending Soon",
                format!(
                    "Your {} trial ends in {}. Subscribe to continue accessing this tool.",
                    tool,
                    days(d)
                ),
                Severity::Warning,
            ),
            None => (
                "Trial Active",
                format!("You're currently trying {}. Enjoy exploring the features!", tool),
                Severity::Info,
            ),
        },
        Scenario::Status(Some(Expired)) => (
            "Subscription Expired",
            format!(
                "Your {} subscription has expired. Renew to regain access to this tool.",
                tool
            ),
            Severity::Destructive,
        ),
        Scenario::Status(Some(Inactive)) => (
            "Subscription Inactive",
            format!(
                "Your {} subscription is currently inactive. Contact support if this is unexpected.",
                tool
            ),
            Severity::Warning,
        ),
        Scenario::Status(None) => (
            "No Access",
            format!(
                "You don't have access to {}. Subscribe to start using this tool.",
                tool
            ),
            Severity::Neutral,
        ),

        Scenario::Transition {
            from: None | Some(Expired) | Some(Inactive),
            to: Active,
        } => (
            "Subscription Activated",
            format!("Great! You now have full access to {}.", tool),
            Severity::Success,
        ),
        Scenario::Transition {
            from: None | Some(Expired) | Some(Inactive),
            to: Trial,
        } => (
            "Trial Started",
            format!("Your {} trial has begun. Explore all features!", tool),
            Severity::Info,
        ),
        Scenario::Transition {
            from: Some(Active) | Some(Trial),
            to: Expired,
        } => (
            "Subscription Expired",
            format!(
                "Your {} subscription has expired. Renew to continue using this tool.",
                tool
            ),
            Severity::Destructive,
        ),
        Scenario::Transition {
            from: Some(Active) | Some(Trial),
            to: Inactive,
        } => (
            "Subscription Deactivated",
            format!(
                "Your {} subscription is now inactive. Contact support if this is unexpected.",
                tool
            ),
            Severity::Warning,
        ),
        Scenario::Transition {
            from: Some(Trial),
            to: Active,
        } => (
            "Subscription Upgraded",
            format!(
                "Welcome! Your {} trial has been converted to a full subscription.",
                tool
            ),
            Severity::Success,
        ),
        Scenario::Transition { to, .. } => (
            "Subscription Updated",
            format!(
                "Your {} subscription status has been updated to {}.",
                tool, to
            ),
            Severity::Info,
        ),

        Scenario::Retrying {
            attempt,
            max_attempts,
        } => (
            "Retrying...",
            format!(
                "Attempting to verify subscription ({}/{})",
                attempt, max_attempts
            ),
            Severity::Neutral,
        ),
        Scenario::UnableToConnect => (
            "Unable to Connect",
            "Unable to verify subscription after multiple attempts. Please refresh the page."
                .to_string(),
            Severity::Destructive,
        ),
        Scenario::ConnectionRestored => (
            "Connection Restored",
            "Successfully verified subscription status.".to_string(),
            Severity::Success,
        ),
        Scenario::Verified => (
            "Subscription Verified",
            format!("Your access to {} has been confirmed.", tool),
            Severity::Success,
        ),

        Scenario::AccessDenied(code) => denied_entry(*code, tool),
    }
}

fn denied_entry(code: ErrorCode, tool: &str) -> (&'static str, String, Severity) {
    match code {
        ErrorCode::AuthError => (
            "Authentication Required",
            format!("Please log in to your account to access {}.", tool),
            Severity::Warning,
        ),
        ErrorCode::NoSubscription => (
            "Subscription Required",
            format!(
                "You need an active subscription to use {}. Subscribe to get started.",
                tool
            ),
            Severity::Destructive,
        ),
        ErrorCode::Expired => (
            "Subscription Expired",
            "Your subscription has expired. Please contact support to renew.".to_string(),
            Severity::Destructive,
        ),
        ErrorCode::Inactive => (
            "Subscription Inactive",
            "Your subscription is inactive. Please contact support.".to_string(),
            Severity::Destructive,
        ),
        ErrorCode::NetworkError => (
            "Connection Error",
            "Unable to verify subscription status. Please check your connection and try again."
                .to_string(),
            Severity::Destructive,
        ),
        ErrorCode::SystemError => (
            "Verification Failed",
            "Something went wrong while verifying your access. Please reload the page or contact support."
                .to_string(),
            Severity::Destructive,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubscriptionStatus::*;

    fn feedback(scenario: Scenario, days: Option<i64>) -> Feedback {
        render(
            &scenario,
            &FeedbackParams::new("Invoice Reconciler").with_days(days),
            &FeedbackConfig::default(),
        )
    }

    #[test]
    fn active_expiring_in_three_days_warns_with_count() {
        let f = feedback(Scenario::Status(Some(Active)), Some(3));
        assert_eq!(f.severity, Severity::Warning);
        assert!(f.description.contains("3 days"));
        assert!(f.duration >= Duration::from_secs(6));
    }

    #[test]
    fn subscription_three_days_from_expiry_warns() {
        use crate::types::{Subscription, Tool};
        use chrono::{Duration as Days, Utc};
        use uuid::Uuid;

        let now = Utc::now();
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id: "alice".into(),
            tool: Tool {
                id: Uuid::new_v4(),
                slug: "invoice-reconciler".into(),
                name: "Invoice Reconciler".into(),
                active: true,
            },
            status: Active,
            started_at: now - Days::days(27),
            expires_at: Some(now + Days::days(3)),
            trial_ends_at: None,
        };

        let f = render(
            &Scenario::Status(Some(sub.status)),
            &FeedbackParams::new(sub.tool.name.clone()).with_days(sub.days_remaining(now)),
            &FeedbackConfig::default(),
        );
        assert_eq!(f.title, "Subscription Expiring");
        assert_eq!(f.severity, Severity::Warning);
        assert!(f.description.contains("3 days"));
        assert!(f.description.contains("Invoice Reconciler"));
    }

    #[test]
    fn single_day_is_singular() {
        let f = feedback(Scenario::Status(Some(Active)), Some(1));
        assert!(f.description.contains("expires in 1 day."));

        let f = feedback(Scenario::Status(Some(Trial)), Some(1));
        assert!(f.description.contains("ends in 1 day."));
    }

    #[test]
    fn thresholds_bound_the_warnings() {
        assert_eq!(feedback(Scenario::Status(Some(Active)), Some(7)).severity, Severity::Warning);
        assert_eq!(feedback(Scenario::Status(Some(Active)), Some(8)).severity, Severity::Info);
        assert_eq!(feedback(Scenario::Status(Some(Active)), None).severity, Severity::Info);
        assert_eq!(feedback(Scenario::Status(Some(Trial)), Some(3)).severity, Severity::Warning);
        assert_eq!(feedback(Scenario::Status(Some(Trial)), Some(4)).severity, Severity::Info);
        assert_eq!(feedback(Scenario::Status(Some(Trial)), Some(0)).severity, Severity::Info);
    }

    #[test]
    fn standing_scenarios() {
        let f = feedback(Scenario::Status(Some(Expired)), None);
        assert_eq!(f.severity, Severity::Destructive);
        let f = feedback(Scenario::Status(Some(Inactive)), None);
        assert_eq!(f.severity, Severity::Warning);
        let f = feedback(Scenario::Status(None), None);
        assert_eq!((f.title.as_str(), f.severity), ("No Access", Severity::Neutral));
        assert_eq!(f.duration, Duration::from_secs(5));
    }

    #[test]
    fn transitions() {
        for from in [None, Some(Expired), Some(Inactive)] {
            let f = feedback(Scenario::Transition { from, to: Active }, None);
            assert_eq!((f.title.as_str(), f.severity), ("Subscription Activated", Severity::Success));
            let f = feedback(Scenario::Transition { from, to: Trial }, None);
            assert_eq!((f.title.as_str(), f.severity), ("Trial Started", Severity::Info));
        }
        for from in [Some(Active), Some(Trial)] {
            let f = feedback(Scenario::Transition { from, to: Expired }, None);
            assert_eq!(f.severity, Severity::Destructive);
            let f = feedback(Scenario::Transition { from, to: Inactive }, None);
            assert_eq!((f.title.as_str(), f.severity), ("Subscription Deactivated", Severity::Warning));
        }

        let f = feedback(Scenario::Transition { from: Some(Trial), to: Active }, None);
        assert_eq!(f.title, "Subscription Upgraded");
        assert!(f.description.contains("Invoice Reconciler"));

        let f = feedback(Scenario::Transition { from: Some(Expired), to: Inactive }, None);
        assert_eq!(f.title, "Subscription Updated");
        assert!(f.description.ends_with("updated to inactive."));
    }

    #[test]
    fn retry_counter_is_visible() {
        let f = feedback(Scenario::Retrying { attempt: 2, max_attempts: 3 }, None);
        assert!(f.description.contains("(2/3)"));
    }

    #[test]
    fn denials_carry_a_call_to_action() {
        let f = feedback(Scenario::AccessDenied(ErrorCode::AuthError), None);
        assert!(f.description.contains("log in"));
        let f = feedback(Scenario::AccessDenied(ErrorCode::NoSubscription), None);
        assert!(f.description.contains("Subscribe"));
        let f = feedback(Scenario::AccessDenied(ErrorCode::Inactive), None);
        assert!(f.description.contains("contact support"));
        let f = feedback(Scenario::AccessDenied(ErrorCode::SystemError), None);
        assert!(f.description.contains("reload"));
    }
}
