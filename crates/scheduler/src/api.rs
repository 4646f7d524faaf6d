use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info};

use pacekeeper_admission::windows::{load_entries, ActivityWindows};
use pacekeeper_admission::{active_stop, AdmissionController};
use pacekeeper_core_types::{JobId, PaceError, Priority, UserId};
use pacekeeper_counter_store::CounterStore;
use pacekeeper_limits_center::LimitsCenter;

use crate::model::{JobPayload, QueueJob};
use crate::pacing::{jittered_delay, last_processed};
use crate::queue::SchedulerQueues;

/// Front door for scheduling work. Enqueue-time checks are a cheap
/// filter; the worker re-validates everything at execution time.
pub struct Scheduler {
    store: Arc<dyn CounterStore>,
    limits: Arc<dyn LimitsCenter>,
    admission: Arc<AdmissionController>,
    queues: Arc<SchedulerQueues>,
    rng: Mutex<StdRng>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn CounterStore>,
        limits: Arc<dyn LimitsCenter>,
        admission: Arc<AdmissionController>,
        queues: Arc<SchedulerQueues>,
    ) -> Self {
        Self {
            store,
            limits,
            admission,
            queues,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn queues(&self) -> &Arc<SchedulerQueues> {
        &self.queues
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Accepts a job for later execution. Rejects while the user is
    /// suspended, when the class's hourly or daily budget is already
    /// spent, or when the minimum inter-action gap since the last
    /// processed job of this class has not elapsed.
    pub async fn enqueue(
        &self,
        user: &UserId,
        payload: JobPayload,
        priority: Priority,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<JobId, PaceError> {
        let now = Utc::now();
        let class = payload.class();

        if let Some(record) = active_stop(self.store.as_ref(), user, now).await? {
            return Err(PaceError::new(format!(
                "automation suspended: {}",
                record.reason.description
            )));
        }

        let snapshot = self.limits.snapshot();
        let rule = snapshot.pacing.for_class(class).clone();

        let entries = load_entries(self.store.as_ref(), user).await?;
        let windows = ActivityWindows::from_entries(&entries, now);
        if windows.day_count_for(class) >= rule.max_per_day {
            return Err(PaceError::new(format!(
                "daily budget for {class} actions reached"
            )));
        }
        let hour_floor = now - ChronoDuration::seconds(3600);
        let hour_count = entries
            .iter()
            .filter(|entry| entry.class == class && entry.ts > hour_floor)
            .count() as u32;
        if hour_count >= rule.max_per_hour {
            return Err(PaceError::new(format!(
                "hourly budget for {class} actions reached"
            )));
        }

        if let Some(last) = last_processed(self.store.as_ref(), user, class).await? {
            let gap_end = last + ChronoDuration::milliseconds(rule.min_delay_ms as i64);
            if now < gap_end {
                return Err(PaceError::new(format!(
                    "minimum delay between {class} actions not elapsed, retry in {}s",
                    (gap_end - now).num_seconds().max(1)
                )));
            }
        }

        let scheduled_at = match scheduled_at {
            Some(at) => at,
            None => {
                let delay = {
                    let mut rng = self
                        .rng
                        .lock()
                        .map_err(|_| PaceError::new("scheduler rng poisoned"))?;
                    jittered_delay(&rule, snapshot.pacing.jitter_pct, &mut rng)
                };
                now + ChronoDuration::from_std(delay)
                    .unwrap_or_else(|_| ChronoDuration::seconds(1))
            }
        };

        let job = QueueJob::new(
            user.clone(),
            payload,
            priority,
            scheduled_at,
            snapshot.retry.max_retries,
        );
        let id = job.id.clone();
        self.queues.push(&job).await?;
        info!(
            target: "scheduler",
            user = %user,
            job = %id,
            %class,
            scheduled_at = %scheduled_at,
            "job enqueued"
        );
        Ok(id)
    }

    pub async fn cancel(&self, user: &UserId, job: &JobId) -> Result<(), PaceError> {
        self.queues.cancel(user, job).await?;
        debug!(target: "scheduler", user = %user, job = %job, "job cancelled");
        Ok(())
    }
}
