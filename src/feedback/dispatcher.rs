use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::feedback::{
    FeedbackConfig,
    messages::{Feedback, FeedbackParams, Scenario, Severity, render},
};

/// Where rendered notifications end up. Delivery must not block.
pub trait FeedbackSink: Send + Sync {
    fn deliver(&self, feedback: Feedback);
}

/// Writes every notification to the log, at a level matching its severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FeedbackSink for TracingSink {
    fn deliver(&self, feedback: Feedback) {
        match feedback.severity {
            Severity::Warning | Severity::Destructive => warn!(
                title = %feedback.title,
                severity = ?feedback.severity,
                "{}",
                feedback.description
            ),
            _ => info!(
                title = %feedback.title,
                severity = ?feedback.severity,
                "{}",
                feedback.description
            ),
        }
    }
}

/// Forwards notifications to a receiver, e.g. a UI task or a test.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Feedback>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Feedback>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FeedbackSink for ChannelSink {
    fn deliver(&self, feedback: Feedback) {
        if self.tx.send(feedback).is_err() {
            debug!("Feedback receiver dropped, discarding notification");
        }
    }
}

pub struct FeedbackDispatcher {
    config: FeedbackConfig,
    sink: Arc<dyn FeedbackSink>,
}

impl FeedbackDispatcher {
    pub fn new(config: FeedbackConfig, sink: Arc<dyn FeedbackSink>) -> Self {
        Self { config, sink }
    }

    pub fn tracing(config: FeedbackConfig) -> Self {
        Self::new(config, Arc::new(TracingSink))
    }

    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Renders the scenario and hands it to the sink. Never fails.
    pub fn notify(&self, scenario: Scenario, params: &FeedbackParams) {
        self.sink.deliver(render(&scenario, params, &self.config));
    }
}
