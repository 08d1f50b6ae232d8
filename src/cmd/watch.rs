use std::{future::Future, sync::Arc};

use anyhow::{Result, bail};
use clap::Args;
use tokio::signal;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::{
    feedback::FeedbackDispatcher,
    utils::clock::SystemClock,
    validator::{ClientValidator, RemoteAccessClient, ValidatorConfig, ValidatorState},
};

#[derive(Args)]
pub struct WatchArgs {
    /// Tool slug to keep validating
    pub tool: String,

    /// Display name used in notifications (defaults to the slug)
    #[arg(long)]
    pub name: Option<String>,

    /// Seconds between background validations
    #[arg(long, default_value_t = 300)]
    pub interval: u64,
}

impl WatchArgs {
    pub async fn execute(
        &self,
        remote: RemoteAccessClient,
        dispatcher: Arc<FeedbackDispatcher>,
    ) -> Result<()> {
        let config = ValidatorConfig {
            poll_interval_secs: self.interval,
            ..ValidatorConfig::default()
        };
        config.validate()?;

        let validator = ClientValidator::new(
            self.tool.clone(),
            self.name.clone().unwrap_or_else(|| self.tool.clone()),
            Arc::new(remote),
            dispatcher,
            Arc::new(SystemClock),
            config,
        );

        let last = follow(&validator, signal::ctrl_c()).await?;
        info!(state = ?last, "Stopped watching");
        validator.deactivate();
        Ok(())
    }
}

/// Activates the validator and logs its results until it stops or `shutdown`
/// completes. Receivers are taken before activation so a validator that goes
/// terminal on its first check is still seen.
async fn follow<S, E>(validator: &ClientValidator, shutdown: S) -> Result<ValidatorState>
where
    S: Future<Output = Result<(), E>>,
{
    let mut updates = validator.updates();
    let mut states = validator.state_changes();

    if !validator.activate() {
        bail!("no caller identity: pass --user or --token");
    }

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
            Some(update) = updates.next() => {
                if let Some(result) = update.filter(|r| !r.is_loading) {
                    info!(
                        has_access = result.has_access(),
                        status = ?result.effective_status(),
                        error = ?result.error,
                        retries = result.retry_count,
                        "Validation result"
                    );
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                if state.is_terminal() {
                    warn!(?state, "Validator stopped; restart to try again");
                    break;
                }
            }
        }
    }

    Ok(validator.state())
}
