use anyhow::Result;
use chrono::Utc;
use clap::Args;
use tracing::{info, warn};

use crate::{
    entitlements::effective_status,
    feedback::{FeedbackDispatcher, FeedbackParams, Scenario, format_time_remaining},
    validator::{AccessChecker, RemoteAccessClient},
};

#[derive(Args)]
pub struct CheckArgs {
    /// Tool slug, e.g. invoice-reconciler
    pub tool: String,
}

impl CheckArgs {
    pub async fn execute(
        &self,
        remote: &RemoteAccessClient,
        dispatcher: &FeedbackDispatcher,
    ) -> Result<()> {
        let decision = remote.check(&self.tool).await?;
        let now = Utc::now();

        let name = decision
            .subscription
            .as_ref()
            .map_or(self.tool.as_str(), |s| s.tool.name.as_str());
        let days = decision
            .subscription
            .as_ref()
            .and_then(|s| s.days_remaining(now));

        if decision.has_access {
            info!(tool = %self.tool, "Access granted");
        } else {
            warn!(tool = %self.tool, reason = ?decision.reason, "Access denied");
        }

        if let Some(at) = decision.subscription.as_ref().and_then(|s| s.governing_date()) {
            let remaining = format_time_remaining(at, now);
            info!(urgent = remaining.is_urgent, "{}", remaining.text);
        }

        dispatcher.notify(
            Scenario::Status(effective_status(&decision)),
            &FeedbackParams::new(name).with_days(days),
        );

        println!("{}", serde_json::to_string_pretty(&decision)?);
        Ok(())
    }
}

#[derive(Args)]
pub struct AccessArgs {
    /// Tool slugs to check
    #[arg(required = true, num_args = 1..)]
    pub tools: Vec<String>,

    /// Require access to every tool instead of any
    #[arg(long)]
    pub require_all: bool,
}

impl AccessArgs {
    pub async fn execute(&self, remote: &RemoteAccessClient) -> Result<()> {
        let access = remote.check_many(&self.tools, self.require_all).await?;

        info!(
            has_access = access.has_access,
            accessible = ?access.accessible_tools,
            inaccessible = ?access.inaccessible_tools,
            "Multi-tool access"
        );

        println!("{}", serde_json::to_string_pretty(&access)?);
        Ok(())
    }
}
