use std::{
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::{
    entitlements::effective_status,
    feedback::{FeedbackDispatcher, FeedbackParams, Scenario},
    metrics::METRICS,
    types::{AccessDecision, ErrorCode, Subscription},
    utils::clock::Clock,
    validator::{
        ValidatorConfig,
        checker::AccessChecker,
        state::{ValidationResult, ValidatorState, classify_denial, classify_failure},
    },
};

/// Keeps one caller's access to one tool up to date.
///
/// Cheap to clone; clones share the same cache and poll task. Results and
/// state are published through watch channels, so any number of observers
/// can follow along. Once deactivated, in-flight work is dropped and nothing
/// is written until the next [`activate`](Self::activate).
#[derive(Clone)]
pub struct ClientValidator {
    inner: Arc<Inner>,
}

struct Inner {
    tool_slug: String,
    tool_name: String,
    checker: Arc<dyn AccessChecker>,
    dispatcher: Arc<FeedbackDispatcher>,
    clock: Arc<dyn Clock>,
    config: ValidatorConfig,

    active: AtomicBool,
    // Bumped on deactivation; work started under an older value is discarded.
    generation: AtomicU64,
    writes: Mutex<()>,

    result: watch::Sender<Option<ValidationResult>>,
    state: watch::Sender<ValidatorState>,
    cancel: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientValidator {
    pub fn new(
        tool_slug: impl Into<String>,
        tool_name: impl Into<String>,
        checker: Arc<dyn AccessChecker>,
        dispatcher: Arc<FeedbackDispatcher>,
        clock: Arc<dyn Clock>,
        config: ValidatorConfig,
    ) -> Self {
        let (result, _) = watch::channel(None);
        let (state, _) = watch::channel(ValidatorState::Idle);
        let (cancel, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                tool_slug: tool_slug.into(),
                tool_name: tool_name.into(),
                checker,
                dispatcher,
                clock,
                config,
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                writes: Mutex::new(()),
                result,
                state,
                cancel,
                poll_task: Mutex::new(None),
            }),
        }
    }

    pub fn tool_slug(&self) -> &str {
        &self.inner.tool_slug
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Starts polling: one silent validation now, then one per poll interval.
    /// Returns `false` and does nothing when the caller is unknown.
    pub fn activate(&self) -> bool {
        let inner = &self.inner;
        if !inner.checker.has_identity() {
            debug!(tool = %inner.tool_slug, "No caller identity, validator stays idle");
            return false;
        }

        let _guard = inner.writes.lock().unwrap_or_else(|e| e.into_inner());
        if inner.active.swap(true, Ordering::SeqCst) {
            return true;
        }

        inner.cancel.send_replace(false);
        inner.state.send_replace(ValidatorState::Idle);

        let task = tokio::spawn(poll_loop(
            Arc::downgrade(inner),
            inner.cancel.subscribe(),
            inner.config.poll_interval(),
        ));
        *inner.poll_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        info!(
            tool = %inner.tool_slug,
            interval_secs = inner.config.poll_interval_secs,
            "Access validator activated"
        );
        true
    }

    /// Stops polling, aborts in-flight validations and drops the cache.
    pub fn deactivate(&self) {
        let inner = &self.inner;
        let _guard = inner.writes.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.active.swap(false, Ordering::SeqCst) {
            return;
        }

        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.cancel.send_replace(true);
        if let Some(task) = inner.poll_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        inner.result.send_replace(None);
        inner.state.send_replace(ValidatorState::Idle);

        info!(tool = %inner.tool_slug, "Access validator deactivated");
    }

    pub fn current(&self) -> Option<ValidationResult> {
        self.inner.result.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ValidationResult>> {
        self.inner.result.subscribe()
    }

    pub fn updates(&self) -> WatchStream<Option<ValidationResult>> {
        WatchStream::new(self.subscribe())
    }

    pub fn state(&self) -> ValidatorState {
        *self.inner.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ValidatorState> {
        self.inner.state.subscribe()
    }

    /// Runs one validation, retrying network failures with backoff.
    ///
    /// `show_loader` marks a manual refresh: the result shows as loading and
    /// the retry count starts over. With `show_feedback` the outcome is always
    /// reported, even when nothing changed. Returns `None` when the validator
    /// is inactive or was deactivated before the validation finished.
    pub async fn validate(&self, show_loader: bool, show_feedback: bool) -> Option<ValidationResult> {
        let inner = &self.inner;
        if !self.is_active() {
            return None;
        }
        let generation = inner.generation.load(Ordering::SeqCst);

        if let ValidatorState::Terminal(code) = self.state() {
            if show_feedback {
                self.write(generation, |inner| {
                    inner.dispatcher.notify(terminal_scenario(code), &self.params(None))
                });
            }
            return self.current();
        }

        let mut cancel = inner.cancel.subscribe();
        let started = self.write(generation, |inner| {
            if show_loader {
                inner.result.send_modify(|r| {
                    let r = r.get_or_insert_with(ValidationResult::default);
                    r.is_loading = true;
                    r.retry_count = 0;
                });
            }
            inner.state.send_replace(ValidatorState::Validating);
        });
        if !started {
            return None;
        }

        let mut attempt = 0;
        loop {
            let outcome = tokio::select! {
                _ = cancelled(&mut cancel) => return None,
                outcome = inner.checker.check(&inner.tool_slug) => outcome,
            };

            let err = match outcome {
                Ok(decision) => return self.complete(generation, decision, attempt, show_feedback),
                Err(err) => err,
            };

            let code = classify_failure(&err);
            attempt += 1;
            warn!(
                tool = %inner.tool_slug,
                error = %err,
                code = %code,
                attempt,
                "Access validation failed"
            );

            if !code.is_retryable() || attempt >= inner.config.max_attempts {
                return self.fail(generation, code);
            }

            METRICS.validator_retries.inc();
            let delay = inner.config.backoff(attempt);
            let retrying = self.write(generation, |inner| {
                inner.result.send_modify(|r| {
                    let r = r.get_or_insert_with(ValidationResult::default);
                    r.retry_count += 1;
                    r.error = Some(code);
                });
                inner.state.send_replace(ValidatorState::Retrying { attempt });
                inner.dispatcher.notify(
                    Scenario::Retrying {
                        attempt,
                        max_attempts: inner.config.max_attempts,
                    },
                    &self.params(None),
                );
            });
            if !retrying {
                return None;
            }

            debug!(tool = %inner.tool_slug, delay_ms = delay.as_millis() as u64, "Backing off");
            tokio::select! {
                _ = cancelled(&mut cancel) => return None,
                _ = time::sleep(delay) => {}
            }
        }
    }

    fn complete(
        &self,
        generation: u64,
        decision: AccessDecision,
        failed_attempts: u32,
        show_feedback: bool,
    ) -> Option<ValidationResult> {
        let now = self.inner.clock.now();
        let error = (!decision.has_access).then(|| classify_denial(&decision));
        let params = self.params(decision.subscription.as_ref());

        let written = self.write(generation, |inner| {
            let previous = inner
                .result
                .borrow()
                .as_ref()
                .and_then(|r| r.decision.as_ref().map(effective_status));

            // Only compare against a completed round trip.
            if let Some(from) = previous {
                let to = effective_status(&decision);
                if from != to {
                    info!(tool = %inner.tool_slug, ?from, ?to, "Subscription status changed");
                    let scenario = match to {
                        Some(to) => Scenario::Transition { from, to },
                        None => Scenario::Status(None),
                    };
                    inner.dispatcher.notify(scenario, &params);
                }
            }

            if failed_attempts > 0 {
                inner.dispatcher.notify(Scenario::ConnectionRestored, &params);
            }

            if show_feedback {
                let scenario = match error {
                    None => Scenario::Verified,
                    Some(code) => Scenario::AccessDenied(code),
                };
                inner.dispatcher.notify(scenario, &params);
            }

            inner.result.send_modify(|r| {
                let r = r.get_or_insert_with(ValidationResult::default);
                r.decision = Some(decision);
                r.last_validated = Some(now);
                r.error = error;
                r.is_loading = false;
            });
            inner.state.send_replace(ValidatorState::Success);
        });

        written.then(|| self.current()).flatten()
    }

    fn fail(&self, generation: u64, code: ErrorCode) -> Option<ValidationResult> {
        let written = self.write(generation, |inner| {
            inner.result.send_modify(|r| {
                let r = r.get_or_insert_with(ValidationResult::default);
                if code == ErrorCode::NetworkError {
                    r.retry_count += 1;
                }
                r.error = Some(code);
                r.is_loading = false;
            });
            inner.state.send_replace(ValidatorState::Terminal(code));
            inner.dispatcher.notify(terminal_scenario(code), &self.params(None));
        });

        if written {
            warn!(tool = %self.inner.tool_slug, code = %code, "Validator stopped, reactivation required");
        }
        written.then(|| self.current()).flatten()
    }

    /// Applies `f` only while the validator is still in the generation the
    /// caller started in.
    fn write(&self, generation: u64, f: impl FnOnce(&Inner)) -> bool {
        let inner = &self.inner;
        let _guard = inner.writes.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.active.load(Ordering::SeqCst) || inner.generation.load(Ordering::SeqCst) != generation {
            debug!(tool = %inner.tool_slug, "Discarding stale validation");
            return false;
        }
        f(inner);
        true
    }

    fn params(&self, subscription: Option<&Subscription>) -> FeedbackParams {
        let name = subscription.map_or(self.inner.tool_name.as_str(), |s| s.tool.name.as_str());
        FeedbackParams::new(name)
            .with_days(subscription.and_then(|s| s.days_remaining(self.inner.clock.now())))
    }
}

fn terminal_scenario(code: ErrorCode) -> Scenario {
    match code {
        ErrorCode::NetworkError => Scenario::UnableToConnect,
        code => Scenario::AccessDenied(code),
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the wait.
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

async fn poll_loop(inner: Weak<Inner>, mut cancel: watch::Receiver<bool>, period: Duration) {
    // The first tick fires immediately and doubles as the activation check.
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancelled(&mut cancel) => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let validator = ClientValidator { inner };

                validator.validate(false, false).await;
                if validator.state().is_terminal() {
                    debug!(tool = %validator.inner.tool_slug, "Polling stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feedback::{ChannelSink, Feedback, FeedbackConfig},
        store::StoreError,
        types::{DenialReason, SubscriptionStatus, Tool},
        utils::clock::ManualClock,
        validator::checker::CheckError,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::{collections::VecDeque, sync::atomic::AtomicUsize};
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    type Outcome = Result<AccessDecision, CheckError>;

    /// Replays queued outcomes; the last one repeats forever.
    struct ScriptedChecker {
        script: Mutex<VecDeque<Outcome>>,
        latency: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedChecker {
        fn new(script: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                latency: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(outcome: Outcome, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::from([outcome])),
                latency: Some(latency),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, outcome: Outcome) {
            *self.script.lock().unwrap() = VecDeque::from([outcome]);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AccessChecker for ScriptedChecker {
        fn has_identity(&self) -> bool {
            true
        }

        async fn check(&self, _tool_slug: &str) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                time::sleep(latency).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    struct Anonymous;

    #[async_trait]
    impl AccessChecker for Anonymous {
        fn has_identity(&self) -> bool {
            false
        }

        async fn check(&self, _tool_slug: &str) -> Outcome {
            Err(CheckError::Unauthenticated)
        }
    }

    fn sub(status: SubscriptionStatus) -> Subscription {
        Subscription {
            id: Uuid::nil(),
            user_id: "alice".into(),
            tool: Tool {
                id: Uuid::nil(),
                slug: "invoice-reconciler".into(),
                name: "Invoice Reconciler".into(),
                active: true,
            },
            status,
            started_at: Utc::now(),
            expires_at: None,
            trial_ends_at: None,
        }
    }

    fn granted(status: SubscriptionStatus) -> Outcome {
        Ok(AccessDecision::granted(sub(status)))
    }

    fn network_down() -> Outcome {
        Err(CheckError::Store(StoreError::Timeout))
    }

    fn validator(checker: Arc<dyn AccessChecker>) -> (ClientValidator, UnboundedReceiver<Feedback>) {
        let (sink, rx) = ChannelSink::new();
        let dispatcher = Arc::new(FeedbackDispatcher::new(FeedbackConfig::default(), Arc::new(sink)));
        let validator = ClientValidator::new(
            "invoice-reconciler",
            "Invoice Reconciler",
            checker,
            dispatcher,
            Arc::new(ManualClock::new(Utc::now())),
            ValidatorConfig::default(),
        );
        (validator, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Feedback>) -> Vec<Feedback> {
        let mut out = Vec::new();
        while let Ok(f) = rx.try_recv() {
            out.push(f);
        }
        out
    }

    async fn wait_for_state(v: &ClientValidator, pred: impl FnMut(&ValidatorState) -> bool) {
        let mut states = v.state_changes();
        time::timeout(Duration::from_secs(600), states.wait_for(pred))
            .await
            .expect("state not reached")
            .expect("validator dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn three_network_failures_end_in_terminal_state() {
        let checker = ScriptedChecker::new(vec![network_down()]);
        let (v, mut rx) = validator(checker.clone());
        let started = time::Instant::now();

        assert!(v.activate());
        wait_for_state(&v, |s| s.is_terminal()).await;

        // Backoff of 1s then 2s between the three attempts.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
        assert_eq!(v.state(), ValidatorState::Terminal(ErrorCode::NetworkError));
        assert_eq!(checker.calls(), 3);

        let result = v.current().unwrap();
        assert_eq!(result.retry_count, 3);
        assert_eq!(result.error, Some(ErrorCode::NetworkError));
        assert!(result.decision.is_none());

        let feedback = drain(&mut rx);
        let titles: Vec<_> = feedback.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["Retrying...", "Retrying...", "Unable to Connect"]);
        assert!(feedback[0].description.contains("(1/3)"));
        assert!(feedback[1].description.contains("(2/3)"));

        // Polling has stopped for good.
        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(checker.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_to_active_is_announced_once() {
        let checker = ScriptedChecker::new(vec![granted(SubscriptionStatus::Trial)]);
        let (v, mut rx) = validator(checker.clone());
        let mut results = v.subscribe();

        v.activate();
        results
            .wait_for(|r| r.as_ref().is_some_and(|r| r.last_validated.is_some()))
            .await
            .unwrap();
        assert!(drain(&mut rx).is_empty());

        checker.set(granted(SubscriptionStatus::Active));
        time::timeout(
            Duration::from_secs(600),
            results.wait_for(|r| {
                r.as_ref()
                    .and_then(|r| r.effective_status())
                    .is_some_and(|s| s == SubscriptionStatus::Active)
            }),
        )
        .await
        .unwrap()
        .unwrap();

        let feedback = drain(&mut rx);
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].title, "Subscription Upgraded");
        assert!(feedback[0].description.contains("Invoice Reconciler"));

        // Unchanged status on the next poll stays quiet.
        time::sleep(Duration::from_secs(301)).await;
        assert!(checker.calls() >= 3);
        assert!(drain(&mut rx).is_empty());
        v.deactivate();
    }

    #[tokio::test(start_paused = true)]
    async fn lapse_between_polls_is_reported_even_though_access_flipped() {
        let checker = ScriptedChecker::new(vec![granted(SubscriptionStatus::Active)]);
        let (v, mut rx) = validator(checker.clone());
        v.activate();
        wait_for_state(&v, |s| *s == ValidatorState::Success).await;

        checker.set(Ok(AccessDecision::denied(
            DenialReason::Expired,
            Some(sub(SubscriptionStatus::Active)),
        )));
        let mut results = v.subscribe();
        results
            .wait_for(|r| r.as_ref().is_some_and(|r| !r.has_access()))
            .await
            .unwrap();

        let result = v.current().unwrap();
        assert_eq!(result.error, Some(ErrorCode::Expired));
        assert_eq!(v.state(), ValidatorState::Success);
        let titles: Vec<_> = drain(&mut rx).into_iter().map(|f| f.title).collect();
        assert_eq!(titles, vec!["Subscription Expired"]);
        v.deactivate();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_resets_retries_and_always_reports() {
        let checker = ScriptedChecker::new(vec![
            network_down(),
            Ok(AccessDecision::denied(DenialReason::NoSubscription, None)),
        ]);
        let (v, mut rx) = validator(checker.clone());
        v.activate();
        wait_for_state(&v, |s| *s == ValidatorState::Success).await;

        let result = v.current().unwrap();
        assert_eq!(result.retry_count, 1);
        assert_eq!(result.error, Some(ErrorCode::NoSubscription));
        let titles: Vec<_> = drain(&mut rx).into_iter().map(|f| f.title).collect();
        assert_eq!(titles, vec!["Retrying...", "Connection Restored"]);

        let refreshed = v.validate(true, true).await.unwrap();
        assert_eq!(refreshed.retry_count, 0);
        assert!(!refreshed.is_loading);
        assert_eq!(refreshed.error, Some(ErrorCode::NoSubscription));
        let titles: Vec<_> = drain(&mut rx).into_iter().map(|f| f.title).collect();
        assert_eq!(titles, vec!["Subscription Required"]);

        checker.set(granted(SubscriptionStatus::Active));
        v.validate(true, true).await.unwrap();
        let titles: Vec<_> = drain(&mut rx).into_iter().map(|f| f.title).collect();
        assert_eq!(titles, vec!["Subscription Activated", "Subscription Verified"]);
        v.deactivate();
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_terminal_without_retry() {
        let checker = ScriptedChecker::new(vec![Err(CheckError::Unauthenticated)]);
        let (v, mut rx) = validator(checker.clone());
        v.activate();
        wait_for_state(&v, |s| s.is_terminal()).await;

        assert_eq!(v.state(), ValidatorState::Terminal(ErrorCode::AuthError));
        assert_eq!(checker.calls(), 1);
        assert_eq!(v.current().unwrap().retry_count, 0);
        assert_eq!(drain(&mut rx)[0].title, "Authentication Required");

        // A manual refresh while terminal reports again but does not retry.
        let cached = v.validate(true, true).await.unwrap();
        assert_eq!(cached.error, Some(ErrorCode::AuthError));
        assert_eq!(checker.calls(), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_written_after_deactivation() {
        let checker = ScriptedChecker::slow(granted(SubscriptionStatus::Active), Duration::from_secs(5));
        let (v, mut rx) = validator(checker.clone());
        v.activate();

        let manual = tokio::spawn({
            let v = v.clone();
            async move { v.validate(true, true).await }
        });
        time::sleep(Duration::from_secs(1)).await;

        v.deactivate();
        let mut results = v.subscribe();
        let mut states = v.state_changes();

        assert!(manual.await.unwrap().is_none());
        time::sleep(Duration::from_secs(900)).await;

        assert!(!results.has_changed().unwrap());
        assert!(!states.has_changed().unwrap());
        assert!(v.current().is_none());
        assert_eq!(v.state(), ValidatorState::Idle);
        assert!(drain(&mut rx).is_empty());
        assert!(v.validate(true, true).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reactivation_recovers_from_terminal() {
        let checker = ScriptedChecker::new(vec![network_down()]);
        let (v, _rx) = validator(checker.clone());
        v.activate();
        wait_for_state(&v, |s| s.is_terminal()).await;

        v.deactivate();
        checker.set(granted(SubscriptionStatus::Active));
        v.activate();
        wait_for_state(&v, |s| *s == ValidatorState::Success).await;
        assert!(v.current().unwrap().has_access());
        v.deactivate();
    }

    #[tokio::test]
    async fn unknown_caller_never_activates() {
        let (v, _rx) = validator(Arc::new(Anonymous));
        assert!(!v.activate());
        assert!(!v.is_active());
        assert!(v.validate(true, true).await.is_none());
        assert_eq!(v.state(), ValidatorState::Idle);
    }
}
