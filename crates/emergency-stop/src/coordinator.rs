use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pacekeeper_admission::heuristic;
use pacekeeper_admission::windows::load_entries;
use pacekeeper_admission::AdmissionController;
use pacekeeper_core_types::{
    EmergencyStopRecord, EndpointId, PaceError, StopReason, UserId,
};
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt};
use pacekeeper_event_bus::{ControlEvent, EventBus};
use pacekeeper_safety_monitor::{EmergencyControl, SafetyMonitor};

/// Actor name used by automated resume paths; it can never resume a
/// manual-resume record.
pub const SWEEP_ACTOR: &str = "system";

/// History window consulted by the pre-resume stop-count check.
const HISTORY_WINDOW_HOURS: i64 = 24;
const HISTORY_CAP: usize = 20;
const HISTORY_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
/// TTL of a manual-resume stop record.
const MANUAL_STOP_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
/// Buffer added to an auto-resumable record's TTL past its resume time.
const AUTO_STOP_TTL_BUFFER_SECS: u64 = 3600;

/// Pre-resume safety thresholds.
const RESUME_MAX_FAILURE_RATE: f64 = 0.50;
const RESUME_MAX_RECENT_STOPS: usize = 3;
const RESUME_MAX_SUSPENDED_FRACTION: f64 = 0.80;

/// Seam to the scheduler: drop every pending job for a user. Bound late
/// because the scheduler consults the coordinator at enqueue time.
#[async_trait]
pub trait QueueDrain: Send + Sync {
    async fn drain_user(&self, user: &UserId) -> Result<usize, PaceError>;
}

/// Owns the per-user and system-wide suspension records. Everything
/// else in the control plane only reads them; creation and deletion go
/// through here so drains and broadcasts happen exactly once per
/// transition.
pub struct StopCoordinator {
    store: Arc<dyn CounterStore>,
    bus: Arc<dyn EventBus<ControlEvent>>,
    admission: Arc<AdmissionController>,
    monitor: Arc<SafetyMonitor>,
    drain: OnceCell<Arc<dyn QueueDrain>>,
}

impl StopCoordinator {
    pub fn new(
        store: Arc<dyn CounterStore>,
        bus: Arc<dyn EventBus<ControlEvent>>,
        admission: Arc<AdmissionController>,
        monitor: Arc<SafetyMonitor>,
    ) -> Self {
        Self {
            store,
            bus,
            admission,
            monitor,
            drain: OnceCell::new(),
        }
    }

    pub fn set_drain(&self, drain: Arc<dyn QueueDrain>) {
        let _ = self.drain.set(drain);
    }

    /// Suspends one user. Idempotent with respect to the queue: a
    /// second trigger while already suspended replaces the reason but
    /// drains nothing.
    pub async fn trigger(
        &self,
        user: &UserId,
        reason: StopReason,
        triggered_by: &str,
    ) -> Result<EmergencyStopRecord, PaceError> {
        let record = EmergencyStopRecord::new(user.clone(), reason, triggered_by);
        let ttl = stop_ttl(&record);
        let written = record.clone();
        let fresh = Arc::new(Mutex::new(true));
        let fresh_flag = Arc::clone(&fresh);
        let stored = self
            .store
            .update_typed::<EmergencyStopRecord, _>(&keys::stop(user), Some(ttl), move |current| {
                match current {
                    Some(mut existing) if existing.active => {
                        // Keep the original trigger time; only the
                        // reason and resume horizon change.
                        existing.reason = written.reason;
                        existing.estimated_resume_at = written.estimated_resume_at;
                        existing.triggered_by = written.triggered_by;
                        if let Ok(mut flag) = fresh_flag.lock() {
                            *flag = false;
                        }
                        Some(existing)
                    }
                    _ => Some(written),
                }
            })
            .await?
            .ok_or_else(|| PaceError::new("stop record vanished during trigger"))?;

        self.push_history(user, stored.triggered_at).await?;

        let fresh = fresh.lock().map(|flag| *flag).unwrap_or(true);
        if fresh {
            info!(
                target: "emergency_stop",
                user = %user,
                reason = %stored.reason.kind,
                triggered_by,
                "emergency stop triggered"
            );
            match self.drain.get() {
                Some(drain) => match drain.drain_user(user).await {
                    Ok(dropped) => {
                        debug!(target: "emergency_stop", user = %user, dropped, "queues drained")
                    }
                    Err(err) => {
                        warn!(target: "emergency_stop", user = %user, error = %err, "queue drain failed")
                    }
                },
                None => warn!(target: "emergency_stop", user = %user, "no queue drain bound"),
            }
            self.bus
                .publish(ControlEvent::EmergencyStopTriggered(stored.clone()))
                .await?;
        } else {
            info!(
                target: "emergency_stop",
                user = %user,
                reason = %stored.reason.kind,
                "emergency stop reason updated"
            );
        }
        Ok(stored)
    }

    /// Current suspension state. An auto-resumable record whose horizon
    /// has passed is resumed inline here, so resumption latency is
    /// bounded by read traffic as well as by the background sweep.
    pub async fn status(&self, user: &UserId) -> Result<Option<EmergencyStopRecord>, PaceError> {
        let record: Option<EmergencyStopRecord> =
            self.store.get_typed(&keys::stop(user)).await?;
        match record {
            Some(record) if record.active => {
                if record.auto_resume_due(Utc::now()) {
                    self.finish_resume(user, SWEEP_ACTOR, false).await?;
                    Ok(None)
                } else {
                    Ok(Some(record))
                }
            }
            _ => Ok(None),
        }
    }

    /// Lifts a suspension. Automated actors can only complete an
    /// elapsed auto-resume; operators additionally pass pre-resume
    /// safety checks. Rejections carry the failing check as the error
    /// message.
    pub async fn resume(
        &self,
        user: &UserId,
        requested_by: &str,
        note: &str,
    ) -> Result<(), PaceError> {
        let record: Option<EmergencyStopRecord> =
            self.store.get_typed(&keys::stop(user)).await?;
        let Some(record) = record.filter(|record| record.active) else {
            return Err(PaceError::NotFound(format!("user {user} is not suspended")));
        };

        let operator = requested_by != SWEEP_ACTOR;
        if !operator {
            if record.manual_resume_required() {
                return Err(PaceError::new("manual approval required"));
            }
            if !record.auto_resume_due(Utc::now()) {
                return Err(PaceError::new("auto-resume time not reached"));
            }
        } else {
            self.pre_resume_checks(user).await?;
        }

        info!(
            target: "emergency_stop",
            user = %user,
            requested_by,
            note,
            "emergency stop resumed"
        );
        self.finish_resume(user, requested_by, operator).await
    }

    /// Suspends every automating user (or an explicit subset). Per-user
    /// failures are logged and skipped; the batch never aborts. The
    /// resulting stops always require manual resume.
    pub async fn trigger_system_wide(
        &self,
        mut reason: StopReason,
        triggered_by: &str,
        affected: Option<Vec<UserId>>,
    ) -> Result<usize, PaceError> {
        reason.auto_resume_after_minutes = None;

        let system_record =
            EmergencyStopRecord::new(UserId::system(), reason.clone(), triggered_by);
        self.store
            .put_typed(
                &keys::stop(&UserId::system()),
                &system_record,
                Some(MANUAL_STOP_TTL),
            )
            .await?;
        self.bus
            .publish(ControlEvent::EmergencyStopTriggered(system_record))
            .await?;

        let users = match affected {
            Some(users) => users,
            None => self.roster().await?,
        };
        let mut stopped = 0usize;
        for user in &users {
            match self.trigger(user, reason.clone(), triggered_by).await {
                Ok(_) => stopped += 1,
                Err(err) => {
                    error!(
                        target: "emergency_stop",
                        user = %user,
                        error = %err,
                        "system-wide stop failed for user"
                    );
                }
            }
        }
        warn!(
            target: "emergency_stop",
            stopped,
            total = users.len(),
            triggered_by,
            "system-wide emergency stop"
        );
        Ok(stopped)
    }

    /// Lifts the system-wide sentinel record; per-user records are
    /// resumed individually.
    pub async fn resume_system_wide(&self, requested_by: &str) -> Result<(), PaceError> {
        if requested_by == SWEEP_ACTOR {
            return Err(PaceError::new("manual approval required"));
        }
        let deleted = self.store.delete(&keys::stop(&UserId::system())).await?;
        if !deleted {
            return Err(PaceError::NotFound("no system-wide stop active".into()));
        }
        info!(target: "emergency_stop", requested_by, "system-wide stop lifted");
        self.bus
            .publish(ControlEvent::EmergencyStopResumed {
                user: UserId::system(),
                resumed_by: requested_by.to_string(),
            })
            .await
    }

    async fn pre_resume_checks(&self, user: &UserId) -> Result<(), PaceError> {
        let entries = load_entries(self.store.as_ref(), user).await?;
        let failure_rate = heuristic::error_ratio(&entries, Utc::now());
        if failure_rate >= RESUME_MAX_FAILURE_RATE {
            return Err(PaceError::new(format!(
                "recent failure rate {:.0}% too high to resume",
                failure_rate * 100.0
            )));
        }

        let history: Vec<DateTime<Utc>> = self
            .store
            .get_typed(&keys::stop_history(user))
            .await?
            .unwrap_or_default();
        let horizon = Utc::now() - ChronoDuration::hours(HISTORY_WINDOW_HOURS);
        let recent = history.iter().filter(|at| **at > horizon).count();
        if recent >= RESUME_MAX_RECENT_STOPS {
            return Err(PaceError::new(format!(
                "{recent} emergency stops in the last {HISTORY_WINDOW_HOURS}h, manual review required"
            )));
        }

        // Load proxy: fraction of the rest of the automating roster
        // currently suspended. A deployment in broad distress should
        // not resume users one by one. The user being resumed does not
        // count against themselves.
        let roster = self.roster().await?;
        let peers: Vec<&UserId> = roster.iter().filter(|other| *other != user).collect();
        if !peers.is_empty() {
            let mut suspended = 0usize;
            for other in &peers {
                let record: Option<EmergencyStopRecord> =
                    self.store.get_typed(&keys::stop(other)).await?;
                if record.map(|record| record.active).unwrap_or(false) {
                    suspended += 1;
                }
            }
            let fraction = suspended as f64 / peers.len() as f64;
            if fraction >= RESUME_MAX_SUSPENDED_FRACTION {
                return Err(PaceError::new(format!(
                    "{:.0}% of automating users suspended, system load too high",
                    fraction * 100.0
                )));
            }
        }
        Ok(())
    }

    /// Common tail of every resume path: delete the record, re-enable
    /// automation, broadcast. Operator resumes additionally reset the
    /// breakers and close out the user's outstanding alerts; an
    /// auto-resume leaves alerts standing since nobody reviewed them.
    async fn finish_resume(
        &self,
        user: &UserId,
        resumed_by: &str,
        operator: bool,
    ) -> Result<(), PaceError> {
        self.store.delete(&keys::stop(user)).await?;
        if operator {
            for key in self.store.keys("breaker:").await? {
                let endpoint = EndpointId::new(key.trim_start_matches("breaker:"));
                self.admission.reset_breaker(&endpoint).await?;
            }
            self.monitor.alerts().resolve_all(user).await?;
        }
        self.monitor.set_automation_enabled(user, true).await?;
        self.bus
            .publish(ControlEvent::EmergencyStopResumed {
                user: user.clone(),
                resumed_by: resumed_by.to_string(),
            })
            .await
    }

    async fn push_history(&self, user: &UserId, at: DateTime<Utc>) -> Result<(), PaceError> {
        self.store
            .update_typed::<Vec<DateTime<Utc>>, _>(
                &keys::stop_history(user),
                Some(HISTORY_TTL),
                move |current| {
                    let mut history = current.unwrap_or_default();
                    if history.last() != Some(&at) {
                        history.push(at);
                    }
                    if history.len() > HISTORY_CAP {
                        let excess = history.len() - HISTORY_CAP;
                        history.drain(..excess);
                    }
                    Some(history)
                },
            )
            .await?;
        Ok(())
    }

    async fn roster(&self) -> Result<Vec<UserId>, PaceError> {
        Ok(self
            .store
            .get_typed::<Vec<UserId>>(keys::AUTOMATING)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl EmergencyControl for StopCoordinator {
    async fn trigger_stop(
        &self,
        user: &UserId,
        reason: StopReason,
        triggered_by: &str,
    ) -> Result<(), PaceError> {
        self.trigger(user, reason, triggered_by).await.map(|_| ())
    }
}

fn stop_ttl(record: &EmergencyStopRecord) -> Duration {
    match record.reason.auto_resume_after_minutes {
        Some(minutes) => Duration::from_secs(minutes * 60 + AUTO_STOP_TTL_BUFFER_SECS),
        None => MANUAL_STOP_TTL,
    }
}

/// Background sweep resuming users whose auto-resume horizon elapsed
/// without anyone querying their status.
pub fn spawn_resume_sweep(
    coordinator: Arc<StopCoordinator>,
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
            let keys = match coordinator.store.keys(keys::STOP_PREFIX).await {
                Ok(keys) => keys,
                Err(err) => {
                    warn!(target: "emergency_stop", error = %err, "sweep could not list stop records");
                    continue;
                }
            };
            for key in keys {
                let user = UserId(key.trim_start_matches(keys::STOP_PREFIX).to_string());
                if user.is_system() {
                    continue;
                }
                // `status` does the lazy auto-resume on our behalf.
                if let Err(err) = coordinator.status(&user).await {
                    warn!(target: "emergency_stop", user = %user, error = %err, "sweep resume failed");
                }
            }
        }
        debug!(target: "emergency_stop", "resume sweep stopped");
    })
}
