use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pacekeeper_admission::windows::{load_entries, local_midnight_utc, ActivityWindows, LogEntry};
use pacekeeper_admission::{heuristic, OutcomeSink};
use pacekeeper_core_types::{
    ActionOutcome, AlertCategory, OverallStatus, PaceError, RiskLevel, SafetyAlert, SafetyStatus,
    Severity, StopReason, StopReasonKind, UserId,
};
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt};
use pacekeeper_limits_center::LimitsCenter;

use crate::alerts::AlertCenter;
use crate::score::{compliance_score, compute_score, status_for, ScoreInputs};

const STATUS_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Seam to the emergency-stop coordinator, bound after construction
/// because the coordinator in turn needs admission for breaker resets.
#[async_trait]
pub trait EmergencyControl: Send + Sync {
    async fn trigger_stop(
        &self,
        user: &UserId,
        reason: StopReason,
        triggered_by: &str,
    ) -> Result<(), PaceError>;
}

/// Recomputes each user's safety posture from the same rolling window
/// the admission controller reads. Evaluation is idempotent: with no
/// new outcomes, two runs produce the same score and status.
pub struct SafetyMonitor {
    store: Arc<dyn CounterStore>,
    limits: Arc<dyn LimitsCenter>,
    alerts: Arc<AlertCenter>,
    emergency: OnceCell<Arc<dyn EmergencyControl>>,
}

impl SafetyMonitor {
    pub fn new(
        store: Arc<dyn CounterStore>,
        limits: Arc<dyn LimitsCenter>,
        alerts: Arc<AlertCenter>,
    ) -> Self {
        Self {
            store,
            limits,
            alerts,
            emergency: OnceCell::new(),
        }
    }

    pub fn set_emergency(&self, control: Arc<dyn EmergencyControl>) {
        let _ = self.emergency.set(control);
    }

    pub fn alerts(&self) -> &Arc<AlertCenter> {
        &self.alerts
    }

    pub async fn status(&self, user: &UserId) -> Result<SafetyStatus, PaceError> {
        Ok(self
            .store
            .get_typed::<SafetyStatus>(&keys::safety(user))
            .await?
            .unwrap_or_else(|| SafetyStatus::healthy(user.clone())))
    }

    /// Re-enables automation after a coordinator-approved resume. The
    /// monitor itself never calls this.
    pub async fn set_automation_enabled(
        &self,
        user: &UserId,
        enabled: bool,
    ) -> Result<(), PaceError> {
        let owner = user.clone();
        self.store
            .update_typed::<SafetyStatus, _>(&keys::safety(user), Some(STATUS_TTL), move |current| {
                let mut status = current.unwrap_or_else(|| SafetyStatus::healthy(owner));
                status.automation_enabled = enabled;
                Some(status)
            })
            .await?;
        Ok(())
    }

    /// Runs every check, raises alerts for what it finds, recomputes
    /// the score from the then-unresolved alert set, persists and
    /// returns the status. Escalates to the coordinator when the user
    /// resolves to critical or suspended while automation is enabled.
    pub async fn evaluate(&self, user: &UserId) -> Result<SafetyStatus, PaceError> {
        let now = Utc::now();
        let entries = load_entries(self.store.as_ref(), user).await?;
        let windows = ActivityWindows::from_entries(&entries, now);
        let snapshot = self.limits.snapshot();
        let policy = &snapshot.scoring;

        let midnight = local_midnight_utc(now);
        let day_entries: Vec<&LogEntry> = entries
            .iter()
            .filter(|entry| entry.ts >= midnight)
            .collect();
        let error_rate = heuristic::error_ratio(&entries, now);
        let compliance = compliance_score(&day_entries);
        let risk = heuristic::assess(&entries, &windows, &snapshot.heuristics, now);

        self.run_checks(user, &entries, &windows, error_rate, compliance, risk, policy)
            .await;

        let active = self.alerts.active(user).await?;
        let inputs = ScoreInputs {
            warning_alerts: count_severity(&active, Severity::Warning),
            critical_alerts: count_severity(&active, Severity::Critical),
            emergency_alerts: count_severity(&active, Severity::Emergency),
            error_rate,
            daily_count: windows.day,
            compliance,
            high_risk: risk == RiskLevel::High,
        };
        let score = compute_score(&inputs, policy);
        let overall = status_for(score, &inputs, policy);

        let previous = self.status(user).await?;
        let mut status = SafetyStatus {
            user: user.clone(),
            score,
            status: overall,
            active_alerts: active,
            last_evaluated_at: now,
            automation_enabled: previous.automation_enabled,
        };

        let degraded = matches!(overall, OverallStatus::Critical | OverallStatus::Suspended);
        if degraded && status.automation_enabled {
            self.escalate(user, &status).await;
            status.automation_enabled = false;
        }

        self.store
            .put_typed(&keys::safety(user), &status, Some(STATUS_TTL))
            .await?;
        debug!(target: "safety_monitor", user = %user, score, status = %overall, "evaluated");
        Ok(status)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_checks(
        &self,
        user: &UserId,
        entries: &[LogEntry],
        windows: &ActivityWindows,
        error_rate: f64,
        compliance: u8,
        risk: RiskLevel,
        policy: &pacekeeper_limits_center::ScoringPolicy,
    ) {
        if error_rate >= policy.error_critical_ratio {
            self.raise(
                user,
                Severity::Critical,
                AlertCategory::ApiError,
                format!("Error rate {:.0}% over the last hour", error_rate * 100.0),
                vec!["Pause automation and inspect failing requests".to_string()],
            )
            .await;
        } else if error_rate >= policy.error_warning_ratio {
            self.raise(
                user,
                Severity::Warning,
                AlertCategory::ApiError,
                "Elevated error rate over the last hour".to_string(),
                vec!["Review recent failures".to_string()],
            )
            .await;
        }

        let cap = policy.daily_action_cap;
        if windows.day > cap {
            self.raise(
                user,
                Severity::Critical,
                AlertCategory::RateLimit,
                "Daily action budget exceeded".to_string(),
                vec!["Stop scheduling until tomorrow".to_string()],
            )
            .await;
        } else if cap > 0 && windows.day * 10 >= cap * 8 {
            self.raise(
                user,
                Severity::Warning,
                AlertCategory::RateLimit,
                "Approaching daily action budget".to_string(),
                vec!["Reduce scheduled volume".to_string()],
            )
            .await;
        }

        if compliance < policy.compliance_critical {
            self.raise(
                user,
                Severity::Critical,
                AlertCategory::ComplianceViolation,
                format!("Compliance score {} is critically low", compliance),
                vec!["Manual review required".to_string()],
            )
            .await;
        } else if compliance < policy.compliance_floor {
            self.raise(
                user,
                Severity::Warning,
                AlertCategory::ComplianceViolation,
                format!("Compliance score {} below threshold", compliance),
                Vec::new(),
            )
            .await;
        }

        if let Some(cov) = heuristic::interval_cov(entries) {
            if cov < self.limits.snapshot().heuristics.regularity_cov {
                self.raise(
                    user,
                    Severity::Warning,
                    AlertCategory::PatternDetection,
                    "Suspiciously regular request timing".to_string(),
                    vec!["Increase pacing jitter".to_string()],
                )
                .await;
            }
        }
        if risk == RiskLevel::High {
            self.raise(
                user,
                Severity::Critical,
                AlertCategory::PatternDetection,
                "High-risk activity pattern detected".to_string(),
                vec!["Throttle this account".to_string()],
            )
            .await;
        }

        if trailing_failures(entries) >= policy.consecutive_failure_limit {
            self.raise(
                user,
                Severity::Critical,
                AlertCategory::ApiError,
                "Consecutive request failures".to_string(),
                vec!["Check credentials and endpoint health".to_string()],
            )
            .await;
        }
    }

    async fn raise(
        &self,
        user: &UserId,
        severity: Severity,
        category: AlertCategory,
        message: String,
        actions: Vec<String>,
    ) {
        let alert = SafetyAlert::new(user.clone(), severity, category, message).with_actions(actions);
        if let Err(err) = self.alerts.raise_alert(alert).await {
            warn!(target: "safety_monitor", user = %user, error = %err, "check alert not recorded");
        }
    }

    async fn escalate(&self, user: &UserId, status: &SafetyStatus) {
        let Some(control) = self.emergency.get() else {
            warn!(target: "safety_monitor", user = %user, "no emergency control bound, cannot escalate");
            return;
        };
        let mut reason = StopReason::categorized(
            StopReasonKind::SuspiciousActivity,
            format!(
                "Safety status degraded to {} (score {})",
                status.status, status.score
            ),
        );
        reason.severity = Severity::Emergency;
        info!(target: "safety_monitor", user = %user, score = status.score, "escalating to emergency stop");
        if let Err(err) = control.trigger_stop(user, reason, "safety_monitor").await {
            error!(target: "safety_monitor", user = %user, error = %err, "emergency escalation failed");
        }
    }
}

#[async_trait]
impl OutcomeSink for SafetyMonitor {
    async fn outcome_recorded(&self, outcome: &ActionOutcome) {
        if let Err(err) = self.evaluate(&outcome.user).await {
            warn!(
                target: "safety_monitor",
                user = %outcome.user,
                error = %err,
                "post-outcome evaluation failed"
            );
        }
    }
}

fn count_severity(alerts: &[SafetyAlert], severity: Severity) -> usize {
    alerts
        .iter()
        .filter(|alert| alert.severity == severity)
        .count()
}

/// Number of failures at the tail of the log.
fn trailing_failures(entries: &[LogEntry]) -> u32 {
    entries
        .iter()
        .rev()
        .take_while(|entry| !entry.success)
        .count() as u32
}

/// Periodic evaluation of every user on the automating roster. Stops
/// when the shutdown watch flips.
pub fn spawn_eval_ticker(
    monitor: Arc<SafetyMonitor>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            let roster: Vec<UserId> = match monitor
                .store
                .get_typed::<Vec<UserId>>(keys::AUTOMATING)
                .await
            {
                Ok(roster) => roster.unwrap_or_default(),
                Err(err) => {
                    warn!(target: "safety_monitor", error = %err, "roster unavailable for sweep");
                    continue;
                }
            };
            for user in roster {
                if let Err(err) = monitor.evaluate(&user).await {
                    warn!(target: "safety_monitor", user = %user, error = %err, "scheduled evaluation failed");
                }
            }
        }
        debug!(target: "safety_monitor", "evaluation ticker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::Mutex as AsyncMutex;

    use pacekeeper_core_types::{ActionClass, EndpointId};
    use pacekeeper_counter_store::MemoryStore;
    use pacekeeper_event_bus::{ControlEvent, InMemoryBus};
    use pacekeeper_limits_center::{default_snapshot, InMemoryLimitsCenter};

    fn monitor_with(store: Arc<dyn CounterStore>) -> SafetyMonitor {
        let limits = Arc::new(InMemoryLimitsCenter::new(
            default_snapshot(),
            Arc::clone(&store),
        ));
        let alerts = Arc::new(AlertCenter::new(
            Arc::clone(&store),
            InMemoryBus::<ControlEvent>::new(32),
        ));
        SafetyMonitor::new(store, limits, alerts)
    }

    async fn seed_log(store: &Arc<dyn CounterStore>, user: &UserId, entries: &Vec<LogEntry>) {
        store
            .put_typed(&keys::outcomes(user), entries, None)
            .await
            .unwrap();
    }

    fn entry(age_secs: i64, success: bool, status_code: u16) -> LogEntry {
        LogEntry {
            ts: Utc::now() - ChronoDuration::seconds(age_secs),
            class: ActionClass::Like,
            endpoint: "/reaction".into(),
            success,
            status_code,
        }
    }

    #[tokio::test]
    async fn quiet_user_evaluates_healthy() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let monitor = monitor_with(Arc::clone(&store));
        let user = UserId::new();

        let status = monitor.evaluate(&user).await.unwrap();
        assert_eq!(status.status, OverallStatus::Healthy);
        assert_eq!(status.score, 100);
        assert!(status.automation_enabled);
    }

    #[tokio::test]
    async fn evaluation_is_idempotent() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let monitor = monitor_with(Arc::clone(&store));
        let user = UserId::new();

        let entries = vec![
            entry(500, true, 200),
            entry(400, true, 200),
            entry(300, false, 500),
            entry(200, false, 500),
        ];
        seed_log(&store, &user, &entries).await;

        let first = monitor.evaluate(&user).await.unwrap();
        let second = monitor.evaluate(&user).await.unwrap();
        assert_eq!(first.score, second.score);
        assert_eq!(first.status, second.status);
        assert_eq!(first.active_alerts.len(), second.active_alerts.len());
    }

    struct RecordingControl {
        stops: AsyncMutex<Vec<(UserId, StopReason)>>,
    }

    #[async_trait]
    impl EmergencyControl for RecordingControl {
        async fn trigger_stop(
            &self,
            user: &UserId,
            reason: StopReason,
            _triggered_by: &str,
        ) -> Result<(), PaceError> {
            self.stops.lock().await.push((user.clone(), reason));
            Ok(())
        }
    }

    #[tokio::test]
    async fn consecutive_failures_escalate_once() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let monitor = monitor_with(Arc::clone(&store));
        let control = Arc::new(RecordingControl {
            stops: AsyncMutex::new(Vec::new()),
        });
        monitor.set_emergency(Arc::clone(&control) as Arc<dyn EmergencyControl>);
        let user = UserId::new();

        // Three straight failures trip both the consecutive-failure and
        // error-rate checks.
        let entries = vec![
            entry(300, false, 500),
            entry(200, false, 500),
            entry(100, false, 500),
        ];
        seed_log(&store, &user, &entries).await;

        let status = monitor.evaluate(&user).await.unwrap();
        assert_eq!(status.status, OverallStatus::Critical);
        assert!(!status.automation_enabled);
        assert_eq!(control.stops.lock().await.len(), 1);

        // Automation is already disabled, so a second evaluation does
        // not re-trigger.
        monitor.evaluate(&user).await.unwrap();
        assert_eq!(control.stops.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn outcome_sink_reevaluates() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let monitor = monitor_with(Arc::clone(&store));
        let user = UserId::new();

        let outcome = ActionOutcome::new(
            user.clone(),
            ActionClass::Like,
            EndpointId::new("/reaction"),
            true,
            200,
            90,
        );
        monitor.outcome_recorded(&outcome).await;

        let stored: Option<SafetyStatus> =
            store.get_typed(&keys::safety(&user)).await.unwrap();
        assert!(stored.is_some());
    }
}
