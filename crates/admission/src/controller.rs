use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike, Utc};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use pacekeeper_core_types::{
    ActionClass, ActionOutcome, AlertCategory, EmergencyStopRecord, EndpointId, PaceError,
    RiskLevel, SafetyAlert, Severity, UserId,
};
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt, StoreError};
use pacekeeper_limits_center::LimitsCenter;

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::decision::AdmissionDecision;
use crate::heuristic;
use crate::windows::{
    append_outcome, load_entries, seconds_to_local_midnight, ActivityWindows,
};

/// Retry horizon for a heuristic-risk denial.
const HEURISTIC_RETRY_SECS: u64 = 1_800;
/// Breaker records expire after a day without traffic; every touch
/// re-arms the clock. Endpoint ids are caller-supplied, so the keyspace
/// must not grow without bound.
const BREAKER_TTL: StdDuration = StdDuration::from_secs(24 * 3600);

/// Receiver of alerts raised at admission time. Bound late because the
/// safety monitor that owns alerting also consumes outcomes from here.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: SafetyAlert);
}

/// Discards alerts; used in tests and before wiring completes.
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn raise(&self, _alert: SafetyAlert) {}
}

/// Downstream consumer of recorded outcomes. The forward is awaited so
/// that scoring sees the outcome before `log_outcome` returns.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn outcome_recorded(&self, outcome: &ActionOutcome);
}

/// Returns the suspension record governing this user right now. The
/// system-wide record dominates the per-user one. A record whose
/// auto-resume horizon has passed reads as "not suspended"; deleting it
/// is the stop coordinator's job, not ours.
pub async fn active_stop(
    store: &dyn CounterStore,
    user: &UserId,
    now: DateTime<Utc>,
) -> Result<Option<EmergencyStopRecord>, StoreError> {
    for key in [keys::stop(&UserId::system()), keys::stop(user)] {
        if let Some(record) = store.get_typed::<EmergencyStopRecord>(&key).await? {
            if record.active && !record.auto_resume_due(now) {
                return Ok(Some(record));
            }
        }
    }
    Ok(None)
}

/// Maps an endpoint path onto the action class whose ceilings apply.
/// Unrecognized endpoints fall into the profile-view bucket, the least
/// sensitive one.
pub fn classify_endpoint(endpoint: &EndpointId) -> ActionClass {
    let path = endpoint.0.to_ascii_lowercase();
    if path.contains("invitation") || path.contains("connect") {
        ActionClass::Connection
    } else if path.contains("reaction") || path.contains("like") {
        ActionClass::Like
    } else if path.contains("comment") {
        ActionClass::Comment
    } else if path.contains("follow") {
        ActionClass::Follow
    } else {
        ActionClass::ProfileView
    }
}

/// Gatekeeper in front of every outbound automated action.
///
/// `validate` never returns an error: when the shared store cannot be
/// read the controller fails closed and denies, because an uncertain
/// state must not be treated as headroom.
pub struct AdmissionController {
    store: Arc<dyn CounterStore>,
    limits: Arc<dyn LimitsCenter>,
    alert_sink: OnceCell<Arc<dyn AlertSink>>,
    outcome_sink: OnceCell<Arc<dyn OutcomeSink>>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn CounterStore>, limits: Arc<dyn LimitsCenter>) -> Self {
        Self {
            store,
            limits,
            alert_sink: OnceCell::new(),
            outcome_sink: OnceCell::new(),
        }
    }

    /// Late wiring; a second call is ignored.
    pub fn set_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        let _ = self.alert_sink.set(sink);
    }

    pub fn set_outcome_sink(&self, sink: Arc<dyn OutcomeSink>) {
        let _ = self.outcome_sink.set(sink);
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Decides whether one request by `user` against `endpoint` may
    /// proceed. Checks run in dominance order and short-circuit on the
    /// first denial: suspension, circuit breaker, minute, hour, day,
    /// behavioral heuristic.
    pub async fn validate(&self, user: &UserId, endpoint: &EndpointId) -> AdmissionDecision {
        let now = Utc::now();

        match active_stop(self.store.as_ref(), user, now).await {
            Ok(Some(record)) => {
                let retry = record
                    .estimated_resume_at
                    .map(|at| (at - now).num_seconds().max(1) as u64);
                return AdmissionDecision::deny(
                    format!("Automation suspended: {}", record.reason.description),
                    retry,
                    RiskLevel::High,
                );
            }
            Ok(None) => {}
            Err(err) => return self.fail_closed(user, "suspension check", err),
        }

        match self.check_breaker(endpoint, now).await {
            Ok(None) => {}
            Ok(Some(denial)) => return denial,
            Err(err) => return self.fail_closed(user, "breaker check", err),
        }

        let entries = match load_entries(self.store.as_ref(), user).await {
            Ok(entries) => entries,
            Err(err) => return self.fail_closed(user, "outcome log read", err),
        };
        let effective = match self.limits.for_user(user).await {
            Ok(effective) => effective,
            Err(err) => {
                warn!(target: "admission", user = %user, error = %err, "limits unavailable, denying");
                return AdmissionDecision::deny(
                    "Rate limit state unavailable",
                    Some(60),
                    RiskLevel::High,
                );
            }
        };
        let windows = ActivityWindows::from_entries(&entries, now);
        let snapshot = self.limits.snapshot();

        // The base minute ceiling governs sustained traffic; a fresh
        // burst after an idle minute is tolerated up to the burst cap.
        let burst_cap = snapshot.windows.minute_burst.max(effective.windows.minute);
        let minute_exceeded = windows.minute >= burst_cap
            || (windows.minute >= effective.windows.minute && windows.prev_minute > 0);
        if minute_exceeded {
            return AdmissionDecision::deny(
                "Per-minute rate limit exceeded",
                Some(60),
                RiskLevel::Medium,
            );
        }

        if windows.hour >= effective.windows.hour {
            return AdmissionDecision::deny(
                "Hourly rate limit exceeded",
                Some(3_600),
                RiskLevel::Medium,
            );
        }

        let class = classify_endpoint(endpoint);
        let class_ceiling = effective.class_daily.for_class(class);
        if windows.day >= effective.windows.day || windows.day_count_for(class) >= class_ceiling {
            return AdmissionDecision::deny(
                "Daily rate limit exceeded",
                Some(seconds_to_local_midnight(now)),
                RiskLevel::High,
            );
        }

        let risk = heuristic::assess(&entries, &windows, &snapshot.heuristics, now);
        if risk == RiskLevel::High {
            return AdmissionDecision::deny(
                "Suspicious activity pattern detected",
                Some(HEURISTIC_RETRY_SECS),
                RiskLevel::High,
            );
        }

        debug!(target: "admission", user = %user, endpoint = %endpoint, %risk, "admitted");
        AdmissionDecision::allow(risk)
    }

    /// Records a completed attempt: risk score, rolling log, breaker
    /// transition, alerts, then the synchronous forward to the safety
    /// monitor. Daily counts are always derived from the rolling log,
    /// so there is no separate aggregate to keep consistent.
    pub async fn log_outcome(&self, mut outcome: ActionOutcome) -> Result<(), PaceError> {
        outcome.risk_score = risk_score(&outcome);
        append_outcome(self.store.as_ref(), &outcome).await?;

        let opened = self.apply_breaker_outcome(&outcome).await?;
        if opened {
            warn!(target: "admission", endpoint = %outcome.endpoint, "circuit breaker opened");
            self.raise(
                SafetyAlert::new(
                    outcome.user.clone(),
                    Severity::Critical,
                    AlertCategory::ApiError,
                    format!("Circuit breaker opened for endpoint {}", outcome.endpoint),
                )
                .with_actions(vec![
                    "Pause traffic to this endpoint".to_string(),
                    "Inspect recent API errors".to_string(),
                ]),
            )
            .await;
        }
        if outcome.rate_limited() {
            self.raise(
                SafetyAlert::new(
                    outcome.user.clone(),
                    Severity::Critical,
                    AlertCategory::RateLimit,
                    format!("Rate limited (HTTP 429) on {}", outcome.endpoint),
                )
                .with_actions(vec!["Reduce request volume".to_string()]),
            )
            .await;
        }

        if let Some(sink) = self.outcome_sink.get() {
            sink.outcome_recorded(&outcome).await;
        }
        Ok(())
    }

    /// Admin/stop-coordinator operation: force an endpoint's breaker
    /// back to closed.
    pub async fn reset_breaker(&self, endpoint: &EndpointId) -> Result<(), PaceError> {
        self.store.delete(&keys::breaker(endpoint)).await?;
        info!(target: "admission", endpoint = %endpoint, "circuit breaker reset");
        Ok(())
    }

    pub async fn breaker_snapshot(
        &self,
        endpoint: &EndpointId,
    ) -> Result<Option<CircuitBreaker>, PaceError> {
        Ok(self
            .store
            .get_typed::<CircuitBreaker>(&keys::breaker(endpoint))
            .await?)
    }

    /// Runs the breaker admission check as one atomic store update so
    /// that only a single caller wins the half-open probe slot.
    async fn check_breaker(
        &self,
        endpoint: &EndpointId,
        now: DateTime<Utc>,
    ) -> Result<Option<AdmissionDecision>, StoreError> {
        let updated = self
            .store
            .update_typed::<CircuitBreaker, _>(
                &keys::breaker(endpoint),
                Some(BREAKER_TTL),
                move |current| {
                    let mut breaker = current.unwrap_or_default();
                    breaker.check(now);
                    Some(breaker)
                },
            )
            .await?;
        let breaker = updated.unwrap_or_default();
        if breaker.state == BreakerState::Open {
            let retry = breaker
                .next_attempt_at
                .map(|at| (at - now).num_seconds().max(1) as u64);
            return Ok(Some(AdmissionDecision::deny(
                format!("Endpoint {} temporarily unavailable", endpoint),
                retry,
                RiskLevel::High,
            )));
        }
        Ok(None)
    }

    /// Applies one outcome to the endpoint's breaker; returns true when
    /// this outcome opened it.
    async fn apply_breaker_outcome(&self, outcome: &ActionOutcome) -> Result<bool, StoreError> {
        let policy = self.limits.snapshot().breaker.clone();
        let success = outcome.success;
        let at = outcome.timestamp;
        let opened = Arc::new(Mutex::new(false));
        let opened_flag = Arc::clone(&opened);
        self.store
            .update_typed::<CircuitBreaker, _>(
                &keys::breaker(&outcome.endpoint),
                Some(BREAKER_TTL),
                move |current| {
                    let mut breaker = current.unwrap_or_default();
                    if success {
                        breaker.record_success(&policy);
                    } else if breaker.record_failure(&policy, at) {
                        if let Ok(mut flag) = opened_flag.lock() {
                            *flag = true;
                        }
                    }
                    Some(breaker)
                },
            )
            .await?;
        let result = opened.lock().map(|flag| *flag).unwrap_or(false);
        Ok(result)
    }

    async fn raise(&self, alert: SafetyAlert) {
        if let Some(sink) = self.alert_sink.get() {
            sink.raise(alert).await;
        }
    }

    fn fail_closed(&self, user: &UserId, stage: &str, err: StoreError) -> AdmissionDecision {
        warn!(target: "admission", user = %user, stage, error = %err, "store unavailable, denying");
        AdmissionDecision::deny("Rate limit state unavailable", Some(60), RiskLevel::High)
    }
}

/// Derived 0-10 analytics score for one outcome.
fn risk_score(outcome: &ActionOutcome) -> u8 {
    if outcome.rate_limited() {
        return 10;
    }
    let mut score = 1u8;
    let hour = outcome.timestamp.with_timezone(&Local).hour();
    if hour < 6 || hour > 22 {
        score += 2;
    }
    if outcome.class == ActionClass::Connection {
        score += 3;
    }
    if !outcome.success {
        score += 5;
    }
    score.min(10)
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::*;
    use chrono::Duration;
    use serde_json::Value;
    use tokio::sync::Mutex as AsyncMutex;

    use pacekeeper_core_types::{StopReason, StopReasonKind};
    use pacekeeper_counter_store::{MemoryStore, UpdateFn};
    use pacekeeper_limits_center::{default_snapshot, InMemoryLimitsCenter};

    fn controller_with(store: Arc<dyn CounterStore>) -> AdmissionController {
        let limits = Arc::new(InMemoryLimitsCenter::new(
            default_snapshot(),
            Arc::clone(&store),
        ));
        AdmissionController::new(store, limits)
    }

    fn controller() -> AdmissionController {
        controller_with(Arc::new(MemoryStore::new()))
    }

    async fn seed_outcomes(
        controller: &AdmissionController,
        user: &UserId,
        endpoint: &str,
        count: usize,
        success: bool,
    ) {
        for _ in 0..count {
            let outcome = ActionOutcome::new(
                user.clone(),
                classify_endpoint(&EndpointId::new(endpoint)),
                EndpointId::new(endpoint),
                success,
                if success { 200 } else { 500 },
                100,
            );
            controller.log_outcome(outcome).await.unwrap();
        }
    }

    #[tokio::test]
    async fn quiet_user_is_admitted() {
        let controller = controller();
        let decision = controller
            .validate(&UserId::new(), &EndpointId::new("/feed/view"))
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn daily_class_ceiling_denies_with_midnight_retry() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let controller = controller_with(Arc::clone(&store));
        let user = UserId::new();

        // Fifteen connection requests spread over the current day, none
        // recent enough to trip the minute or burst checks. Default
        // connection ceiling is 15 per day.
        let now = Utc::now();
        let midnight = crate::windows::local_midnight_utc(now);
        let mut log = Vec::new();
        for i in 0..15i64 {
            let mut ts = now - Duration::seconds(120 * (i + 1));
            if ts < midnight {
                ts = midnight + Duration::seconds(15 - i);
            }
            log.push(crate::windows::LogEntry {
                ts,
                class: ActionClass::Connection,
                endpoint: "/invitation".into(),
                success: true,
                status_code: 200,
            });
        }
        log.sort_by_key(|entry| entry.ts);
        store
            .put_typed(&keys::outcomes(&user), &log, None)
            .await
            .unwrap();

        let decision = controller
            .validate(&user, &EndpointId::new("/invitation"))
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("Daily rate limit exceeded"));
        assert_eq!(decision.risk_level, RiskLevel::High);
        let retry = decision.retry_after_secs.unwrap();
        assert!(retry >= 1 && retry <= 24 * 3600);
    }

    #[tokio::test]
    async fn tight_burst_is_denied_as_suspicious() {
        let controller = controller();
        let user = UserId::new();
        seed_outcomes(&controller, &user, "/reaction", 5, true).await;

        let decision = controller.validate(&user, &EndpointId::new("/reaction")).await;
        assert!(!decision.allowed);
        assert_eq!(decision.risk_level, RiskLevel::High);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Suspicious activity pattern detected")
        );
    }

    #[tokio::test]
    async fn open_breaker_denies_until_cooldown() {
        let controller = controller();
        let user = UserId::new();
        let endpoint = EndpointId::new("/invitation");
        seed_outcomes(&controller, &user, "/invitation", 5, false).await;

        let snapshot = controller.breaker_snapshot(&endpoint).await.unwrap().unwrap();
        assert_eq!(snapshot.state, BreakerState::Open);

        // A different user is blocked too; the breaker is per endpoint.
        let decision = controller.validate(&UserId::new(), &endpoint).await;
        assert!(!decision.allowed);
        assert_eq!(decision.risk_level, RiskLevel::High);
        assert!(decision.retry_after_secs.unwrap() > 0);
    }

    #[tokio::test]
    async fn elapsed_cooldown_admits_a_probe() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let controller = controller_with(Arc::clone(&store));
        let endpoint = EndpointId::new("/invitation");

        let mut breaker = CircuitBreaker::default();
        breaker.state = BreakerState::Open;
        breaker.consecutive_failures = 5;
        breaker.next_attempt_at = Some(Utc::now() - Duration::seconds(1));
        store
            .put_typed(&keys::breaker(&endpoint), &breaker, None)
            .await
            .unwrap();

        let decision = controller.validate(&UserId::new(), &endpoint).await;
        assert!(decision.allowed);
        let after = controller.breaker_snapshot(&endpoint).await.unwrap().unwrap();
        assert_eq!(after.state, BreakerState::HalfOpen);
    }

    #[tokio::test]
    async fn suspension_dominates_everything() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let controller = controller_with(Arc::clone(&store));
        let user = UserId::new();

        let record = EmergencyStopRecord::new(
            user.clone(),
            StopReason::categorized(StopReasonKind::RateLimit, "429 storm"),
            "safety_monitor",
        );
        store
            .put_typed(&keys::stop(&user), &record, None)
            .await
            .unwrap();

        let decision = controller.validate(&user, &EndpointId::new("/feed/view")).await;
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().starts_with("Automation suspended"));
        assert!(decision.retry_after_secs.is_some());
    }

    #[tokio::test]
    async fn elapsed_auto_resume_reads_as_not_suspended() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let controller = controller_with(Arc::clone(&store));
        let user = UserId::new();

        let mut record = EmergencyStopRecord::new(
            user.clone(),
            StopReason::categorized(StopReasonKind::SystemOverload, "load spike"),
            "safety_monitor",
        );
        record.estimated_resume_at = Some(Utc::now() - Duration::seconds(5));
        store
            .put_typed(&keys::stop(&user), &record, None)
            .await
            .unwrap();

        let decision = controller.validate(&user, &EndpointId::new("/feed/view")).await;
        assert!(decision.allowed);
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn put(
            &self,
            _key: &str,
            _value: Value,
            _ttl: Option<StdDuration>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn incr(&self, _key: &str, _ttl: Option<StdDuration>) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn update(
            &self,
            _key: &str,
            _ttl: Option<StdDuration>,
            _f: UpdateFn,
        ) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn store_outage_fails_closed() {
        let controller = controller_with(Arc::new(FailingStore));
        let decision = controller
            .validate(&UserId::new(), &EndpointId::new("/feed/view"))
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.risk_level, RiskLevel::High);
    }

    struct RecordingSink {
        alerts: AsyncMutex<Vec<SafetyAlert>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn raise(&self, alert: SafetyAlert) {
            self.alerts.lock().await.push(alert);
        }
    }

    #[tokio::test]
    async fn rate_limited_outcome_raises_a_critical_alert() {
        let controller = controller();
        let sink = Arc::new(RecordingSink {
            alerts: AsyncMutex::new(Vec::new()),
        });
        controller.set_alert_sink(Arc::clone(&sink) as Arc<dyn AlertSink>);

        let user = UserId::new();
        let outcome = ActionOutcome::new(
            user,
            ActionClass::Like,
            EndpointId::new("/reaction"),
            false,
            429,
            80,
        );
        controller.log_outcome(outcome).await.unwrap();

        let alerts = sink.alerts.lock().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].category, AlertCategory::RateLimit);
    }

    struct TtlRecordingStore {
        inner: MemoryStore,
        update_ttls: AsyncMutex<Vec<(String, Option<StdDuration>)>>,
    }

    #[async_trait]
    impl CounterStore for TtlRecordingStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(key).await
        }
        async fn put(
            &self,
            key: &str,
            value: Value,
            ttl: Option<StdDuration>,
        ) -> Result<(), StoreError> {
            self.inner.put(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.delete(key).await
        }
        async fn incr(&self, key: &str, ttl: Option<StdDuration>) -> Result<u64, StoreError> {
            self.inner.incr(key, ttl).await
        }
        async fn update(
            &self,
            key: &str,
            ttl: Option<StdDuration>,
            f: UpdateFn,
        ) -> Result<Option<Value>, StoreError> {
            self.update_ttls.lock().await.push((key.to_string(), ttl));
            self.inner.update(key, ttl, f).await
        }
        async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.keys(prefix).await
        }
    }

    #[tokio::test]
    async fn breaker_records_carry_an_expiry() {
        let store = Arc::new(TtlRecordingStore {
            inner: MemoryStore::new(),
            update_ttls: AsyncMutex::new(Vec::new()),
        });
        let controller = controller_with(Arc::clone(&store) as Arc<dyn CounterStore>);
        let user = UserId::new();

        let outcome = ActionOutcome::new(
            user.clone(),
            ActionClass::Like,
            EndpointId::new("/reaction"),
            false,
            500,
            100,
        );
        controller.log_outcome(outcome).await.unwrap();
        controller.validate(&user, &EndpointId::new("/reaction")).await;

        let ttls = store.update_ttls.lock().await;
        let breaker_writes: Vec<_> = ttls
            .iter()
            .filter(|(key, _)| key.starts_with("breaker:"))
            .collect();
        assert!(breaker_writes.len() >= 2, "outcome and check both touch the breaker");
        for (key, ttl) in breaker_writes {
            assert!(
                ttl.is_some(),
                "breaker key {key} must expire after inactivity"
            );
        }
    }

    #[tokio::test]
    async fn log_outcome_writes_no_aggregate_counters() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let controller = controller_with(Arc::clone(&store));
        let user = UserId::new();
        seed_outcomes(&controller, &user, "/reaction", 3, true).await;

        // Day counts are derived from the rolling log; nothing else is
        // written per outcome besides the log and the breaker.
        assert!(store.keys("daily").await.unwrap().is_empty());
        assert_eq!(store.keys("outcomes:").await.unwrap().len(), 1);
        assert_eq!(store.keys("breaker:").await.unwrap().len(), 1);
    }

    #[test]
    fn risk_score_components() {
        let user = UserId::new();
        let mut outcome = ActionOutcome::new(
            user,
            ActionClass::Like,
            EndpointId::new("/reaction"),
            false,
            429,
            80,
        );
        assert_eq!(risk_score(&outcome), 10);

        outcome.status_code = 500;
        // Failure adds 5 regardless of class or time of day.
        assert!(risk_score(&outcome) >= 6);
        outcome.success = true;
        outcome.status_code = 200;
        assert!(risk_score(&outcome) <= 3);
    }

    #[test]
    fn endpoint_classification() {
        assert_eq!(
            classify_endpoint(&EndpointId::new("/invitation")),
            ActionClass::Connection
        );
        assert_eq!(
            classify_endpoint(&EndpointId::new("/posts/123/comment")),
            ActionClass::Comment
        );
        assert_eq!(
            classify_endpoint(&EndpointId::new("/something-else")),
            ActionClass::ProfileView
        );
    }
}
