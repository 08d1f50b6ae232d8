use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Trial,
    Expired,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "trial" => Ok(SubscriptionStatus::Trial),
            "expired" => Ok(SubscriptionStatus::Expired),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub active: bool,
}

/// Snapshot of a user's subscription to one tool, as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: String,
    pub tool: Tool,
    pub status: SubscriptionStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Whole days until `expires_at`, rounded up. `None` when no expiry is set.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|exp| days_between(now, exp))
    }

    pub fn days_until_trial_end(&self, now: DateTime<Utc>) -> Option<i64> {
        self.trial_ends_at.map(|end| days_between(now, end))
    }

    /// The date that ends access under the current status, if any.
    pub fn governing_date(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SubscriptionStatus::Active => self.expires_at,
            SubscriptionStatus::Trial => self.trial_ends_at,
            SubscriptionStatus::Expired | SubscriptionStatus::Inactive => None,
        }
    }

    /// Days left on whichever date governs the current status.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.governing_date().map(|at| days_between(now, at))
    }
}

pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let diff_ms = (to - from).num_milliseconds() as f64;
    (diff_ms / MS_PER_DAY).ceil() as i64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl CallerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}
