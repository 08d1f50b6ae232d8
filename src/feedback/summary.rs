use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    entitlements::{effective_status, resolve_subscription},
    feedback::messages::{EXPIRING_SOON_DAYS, TRIAL_ENDING_DAYS},
    types::{Subscription, SubscriptionStatus, subscription::days_between},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionKind {
    Expiring,
    TrialEnding,
    Expired,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Renew,
    Subscribe,
    ContactSupport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttentionItem {
    pub tool_slug: String,
    pub tool_name: String,
    pub kind: AttentionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
    pub action: SuggestedAction,
}

/// Dashboard counts over a user's subscriptions. Rows are bucketed by the
/// status the user actually experiences at `now`, so a lapsed `active` row
/// counts as expired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub active: usize,
    pub trial: usize,
    pub expired: usize,
    pub inactive: usize,
    pub expiring_soon: usize,
    pub needs_attention: Vec<AttentionItem>,
}

pub fn status_summary(subscriptions: &[Subscription], now: DateTime<Utc>) -> StatusSummary {
    let mut summary = StatusSummary {
        total: subscriptions.len(),
        ..Default::default()
    };

    for sub in subscriptions {
        let attention = |kind, days_remaining, action| AttentionItem {
            tool_slug: sub.tool.slug.clone(),
            tool_name: sub.tool.name.clone(),
            kind,
            days_remaining,
            action,
        };

        let status = effective_status(&resolve_subscription(Some(sub), now)).unwrap_or(sub.status);

        match status {
            SubscriptionStatus::Active => {
                summary.active += 1;
                if let Some(days) = sub
                    .days_until_expiry(now)
                    .filter(|d| *d > 0 && *d <= EXPIRING_SOON_DAYS)
                {
                    summary.expiring_soon += 1;
                    summary.needs_attention.push(attention(
                        AttentionKind::Expiring,
                        Some(days),
                        SuggestedAction::Renew,
                    ));
                }
            }
            SubscriptionStatus::Trial => {
                summary.trial += 1;
                if let Some(days) = sub
                    .days_until_trial_end(now)
                    .filter(|d| *d > 0 && *d <= TRIAL_ENDING_DAYS)
                {
                    summary.needs_attention.push(attention(
                        AttentionKind::TrialEnding,
                        Some(days),
                        SuggestedAction::Subscribe,
                    ));
                }
            }
            SubscriptionStatus::Expired => {
                summary.expired += 1;
                summary.needs_attention.push(attention(
                    AttentionKind::Expired,
                    None,
                    SuggestedAction::Renew,
                ));
            }
            SubscriptionStatus::Inactive => {
                summary.inactive += 1;
                summary.needs_attention.push(attention(
                    AttentionKind::Inactive,
                    None,
                    SuggestedAction::ContactSupport,
                ));
            }
        }
    }

    summary
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRemaining {
    pub text: String,
    pub is_urgent: bool,
}

pub fn format_time_remaining(date: DateTime<Utc>, now: DateTime<Utc>) -> TimeRemaining {
    let days = days_between(now, date);
    let (text, is_urgent) = match days {
        d if d <= 0 => ("Expired".to_string(), true),
        1 => ("1 day left".to_string(), true),
        d if d <= 7 => (format!("{} days left", d), true),
        d if d <= 30 => (format!("{} days left", d), false),
        d => {
            let months = d / 30;
            let plural = if months > 1 { "s" } else { "" };
            (format!("{} month{} left", months, plural), false)
        }
    };
    TimeRemaining { text, is_urgent }
}
