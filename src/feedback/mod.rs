//! User-facing notifications: the scenario table, the dispatcher that
//! delivers rendered messages, and dashboard summaries.

pub mod dispatcher;
pub mod messages;
pub mod summary;

use std::time::Duration;

use serde::Deserialize;

pub use dispatcher::{ChannelSink, FeedbackDispatcher, FeedbackSink, TracingSink};
pub use messages::{Feedback, FeedbackParams, Scenario, Severity};
pub use summary::{StatusSummary, TimeRemaining, format_time_remaining, status_summary};

/// Warning and destructive messages never stay up for less than this.
pub const MIN_ALERT_DURATION_MS: u64 = 6000;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_duration_ms")]
    pub default_duration_ms: u64,

    #[serde(default = "default_alert_duration_ms")]
    pub alert_duration_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: default_duration_ms(),
            alert_duration_ms: default_alert_duration_ms(),
        }
    }
}

impl FeedbackConfig {
    pub fn duration_for(&self, severity: Severity) -> Duration {
        if severity.is_alert() {
            Duration::from_millis(self.alert_duration_ms.max(MIN_ALERT_DURATION_MS))
        } else {
            Duration::from_millis(self.default_duration_ms)
        }
    }
}

fn default_duration_ms() -> u64 {
    5000
}

fn default_alert_duration_ms() -> u64 {
    MIN_ALERT_DURATION_MS
}
