pub mod check;
pub mod watch;

use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{HeaderName, HeaderValue};
use clap::{Parser, Subcommand};

use crate::{
    cmd::{
        check::{AccessArgs, CheckArgs},
        watch::WatchArgs,
    },
    validator::RemoteAccessClient,
};

#[derive(Parser)]
#[command(name = "toolpass")]
#[command(about = "Check and watch tool access against a toolpass server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the toolpass server
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    pub server: String,

    /// Bearer token forwarded to the server
    #[arg(long, global = true, conflicts_with = "user")]
    pub token: Option<String>,

    /// User id sent in the trusted identity header (local and test setups)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Identity header name used with --user
    #[arg(long, global = true, default_value = "x-user-id")]
    pub identity_header: String,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true, default_value_t = 2000)]
    pub timeout_ms: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check access to a single tool
    Check(CheckArgs),

    /// Check access to several tools at once
    Access(AccessArgs),

    /// Keep validating access to a tool until interrupted
    Watch(WatchArgs),
}

impl Cli {
    pub fn remote(&self) -> Result<RemoteAccessClient> {
        let mut client =
            RemoteAccessClient::new(&self.server, Duration::from_millis(self.timeout_ms))?;

        if let Some(token) = &self.token {
            client = client.with_bearer(token).context("invalid --token")?;
        }
        if let Some(user) = &self.user {
            let name = HeaderName::try_from(self.identity_header.as_str())
                .context("invalid --identity-header")?;
            let value = HeaderValue::from_str(user).context("invalid --user")?;
            client = client.with_header(name, value);
        }
        Ok(client)
    }
}
