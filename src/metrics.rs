use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct ToolpassMetrics {
    pub guard_allowed: IntCounter,
    pub guard_redirected: IntCounterVec,
    pub store_errors: IntCounterVec,
    pub validator_retries: IntCounter,
    pub guard_duration: Histogram,
    registry: Registry,
}

impl ToolpassMetrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let guard_allowed = IntCounter::new(
            "toolpass_guard_allowed_total",
            "Protected requests let through by the route guard",
        )?;
        let guard_redirected = IntCounterVec::new(
            Opts::new(
                "toolpass_guard_redirected_total",
                "Protected requests redirected by the route guard",
            ),
            &["error"],
        )?;
        let store_errors = IntCounterVec::new(
            Opts::new(
                "toolpass_store_errors_total",
                "Entitlement store calls that failed",
            ),
            &["transient"],
        )?;
        let validator_retries = IntCounter::new(
            "toolpass_validator_retries_total",
            "Access validations retried after a network error",
        )?;
        let guard_duration = Histogram::with_opts(
            HistogramOpts::new(
                "toolpass_guard_duration_seconds",
                "Time spent deciding a protected request",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;

        registry.register(Box::new(guard_allowed.clone()))?;
        registry.register(Box::new(guard_redirected.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(validator_retries.clone()))?;
        registry.register(Box::new(guard_duration.clone()))?;

        Ok(Self {
            guard_allowed,
            guard_redirected,
            store_errors,
            validator_retries,
            guard_duration,
            registry,
        })
    }

    pub fn record_store_error(&self, transient: bool) {
        self.store_errors
            .with_label_values(&[if transient { "true" } else { "false" }])
            .inc();
    }

    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).unwrap_or_default()
    }
}

// Metric names and label sets are static.
pub static METRICS: Lazy<ToolpassMetrics> =
    Lazy::new(|| ToolpassMetrics::new().expect("metric definitions are valid"));

pub async fn metrics_handler() -> String {
    METRICS.encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_families() {
        METRICS.guard_allowed.inc();
        METRICS.guard_redirected.with_label_values(&["no_subscription"]).inc();
        let text = METRICS.encode();
        assert!(text.contains("toolpass_guard_allowed_total"));
        assert!(text.contains("error=\"no_subscription\""));
    }
}
