use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pacekeeper_core_types::{ActionClass, JobId, PaceError, Priority, UserId};
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt, StoreError};
use pacekeeper_emergency_stop::QueueDrain;
use pacekeeper_event_bus::{ControlEvent, EventBus, QueueUpdate};

use crate::model::{JobStatus, QueueJob};

const JOB_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Lightweight index entry; the full job lives under its own key so
/// the per-class index stays small under atomic rewrites.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueRef {
    pub job: JobId,
    pub user: UserId,
    pub priority: Priority,
    pub scheduled_at: DateTime<Utc>,
}

/// Store-backed per-class queues. Index mutation and job status
/// transitions are each single-key atomic updates, so two workers
/// polling the same class cannot both claim one job.
pub struct SchedulerQueues {
    store: Arc<dyn CounterStore>,
    bus: Arc<dyn EventBus<ControlEvent>>,
}

impl SchedulerQueues {
    pub fn new(store: Arc<dyn CounterStore>, bus: Arc<dyn EventBus<ControlEvent>>) -> Self {
        Self { store, bus }
    }

    pub async fn push(&self, job: &QueueJob) -> Result<(), PaceError> {
        self.store
            .put_typed(&keys::job(&job.id), job, Some(JOB_TTL))
            .await?;
        let entry = QueueRef {
            job: job.id.clone(),
            user: job.user.clone(),
            priority: job.priority,
            scheduled_at: job.scheduled_at,
        };
        self.store
            .update_typed::<Vec<QueueRef>, _>(&keys::queue(job.class), None, move |current| {
                let mut index = current.unwrap_or_default();
                index.push(entry);
                Some(index)
            })
            .await?;
        self.publish_update(&job.user, &job.id, JobStatus::Pending, None)
            .await;
        Ok(())
    }

    /// Claims the next due job of a class: highest priority first, then
    /// earliest scheduled time. Entries whose job record is gone or no
    /// longer pending are discarded and the scan continues.
    pub async fn pop_due(
        &self,
        class: ActionClass,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueJob>, PaceError> {
        loop {
            let Some(entry) = self.take_best_due(class, now).await? else {
                return Ok(None);
            };
            match self.claim(&entry.job).await? {
                Some(job) => return Ok(Some(job)),
                // Cancelled or vanished since it was indexed.
                None => continue,
            }
        }
    }

    /// Atomically removes the best due entry from the class index.
    async fn take_best_due(
        &self,
        class: ActionClass,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueRef>, StoreError> {
        let taken = Arc::new(Mutex::new(None::<QueueRef>));
        let taken_slot = Arc::clone(&taken);
        self.store
            .update_typed::<Vec<QueueRef>, _>(&keys::queue(class), None, move |current| {
                let mut index = current.unwrap_or_default();
                let best = index
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.scheduled_at <= now)
                    .min_by_key(|(_, entry)| (entry.priority.index(), entry.scheduled_at))
                    .map(|(position, _)| position);
                if let Some(position) = best {
                    let entry = index.remove(position);
                    if let Ok(mut slot) = taken_slot.lock() {
                        *slot = Some(entry);
                    }
                }
                Some(index)
            })
            .await?;
        let result = taken.lock().ok().and_then(|slot| slot.clone());
        Ok(result)
    }

    /// Pending -> Processing compare-and-swap on the job record.
    async fn claim(&self, id: &JobId) -> Result<Option<QueueJob>, StoreError> {
        let claimed = Arc::new(Mutex::new(None::<QueueJob>));
        let claimed_slot = Arc::clone(&claimed);
        self.store
            .update_typed::<QueueJob, _>(&keys::job(id), Some(JOB_TTL), move |current| {
                current.map(|mut job| {
                    if job.status == JobStatus::Pending {
                        job.status = JobStatus::Processing;
                        if let Ok(mut slot) = claimed_slot.lock() {
                            *slot = Some(job.clone());
                        }
                    }
                    job
                })
            })
            .await?;
        let result = claimed.lock().ok().and_then(|slot| slot.clone());
        Ok(result)
    }

    /// Moves a processing job to a terminal state, or back to pending
    /// for a retry.
    pub async fn transition(
        &self,
        id: &JobId,
        next: JobStatus,
        error: Option<String>,
        reschedule_at: Option<DateTime<Utc>>,
        priority: Option<Priority>,
    ) -> Result<Option<QueueJob>, PaceError> {
        let updated = self
            .store
            .update_typed::<QueueJob, _>(&keys::job(id), Some(JOB_TTL), move |current| {
                current.map(|mut job| {
                    if job.status.can_transition(next) {
                        job.status = next;
                        job.error = error;
                        if let Some(at) = reschedule_at {
                            job.scheduled_at = at;
                        }
                        if let Some(priority) = priority {
                            job.priority = priority;
                        }
                        if next == JobStatus::Pending {
                            job.retry_count += 1;
                        }
                    }
                    job
                })
            })
            .await?;
        let job = updated.filter(|job| job.status == next);
        if let Some(ref job) = job {
            if next == JobStatus::Pending {
                // Back onto the index for the retry.
                let entry = QueueRef {
                    job: job.id.clone(),
                    user: job.user.clone(),
                    priority: job.priority,
                    scheduled_at: job.scheduled_at,
                };
                let class = job.class;
                self.store
                    .update_typed::<Vec<QueueRef>, _>(&keys::queue(class), None, move |current| {
                        let mut index = current.unwrap_or_default();
                        index.push(entry);
                        Some(index)
                    })
                    .await?;
            }
            self.publish_update(&job.user, &job.id, next, job.error.clone())
                .await;
        }
        Ok(job)
    }

    /// Requeues a claimed job without consuming a retry, e.g. after a
    /// pre-flight deny with a retry horizon.
    pub async fn defer(&self, id: &JobId, until: DateTime<Utc>) -> Result<(), PaceError> {
        let updated = self
            .store
            .update_typed::<QueueJob, _>(&keys::job(id), Some(JOB_TTL), move |current| {
                current.map(|mut job| {
                    if job.status == JobStatus::Processing {
                        job.status = JobStatus::Pending;
                        job.scheduled_at = until;
                    }
                    job
                })
            })
            .await?;
        if let Some(job) = updated.filter(|job| job.status == JobStatus::Pending) {
            let entry = QueueRef {
                job: job.id.clone(),
                user: job.user.clone(),
                priority: job.priority,
                scheduled_at: job.scheduled_at,
            };
            self.store
                .update_typed::<Vec<QueueRef>, _>(&keys::queue(job.class), None, move |current| {
                    let mut index = current.unwrap_or_default();
                    index.push(entry);
                    Some(index)
                })
                .await?;
        }
        Ok(())
    }

    pub async fn job(&self, id: &JobId) -> Result<Option<QueueJob>, PaceError> {
        Ok(self.store.get_typed(&keys::job(id)).await?)
    }

    /// Owner-only cancellation, legal only while pending.
    pub async fn cancel(&self, user: &UserId, id: &JobId) -> Result<(), PaceError> {
        let Some(job) = self.job(id).await? else {
            return Err(PaceError::NotFound(format!("job {id} not found")));
        };
        if &job.user != user {
            return Err(PaceError::new("job belongs to another user"));
        }
        let cancelled = self
            .store
            .update_typed::<QueueJob, _>(&keys::job(id), Some(JOB_TTL), |current| {
                current.map(|mut job| {
                    if job.status == JobStatus::Pending {
                        job.status = JobStatus::Cancelled;
                    }
                    job
                })
            })
            .await?;
        match cancelled {
            Some(job) if job.status == JobStatus::Cancelled => {
                self.publish_update(user, id, JobStatus::Cancelled, None).await;
                Ok(())
            }
            Some(job) => Err(PaceError::new(format!(
                "job is {}, only pending jobs can be cancelled",
                job.status.as_str()
            ))),
            None => Err(PaceError::NotFound(format!("job {id} not found"))),
        }
    }

    async fn publish_update(
        &self,
        user: &UserId,
        job: &JobId,
        status: JobStatus,
        detail: Option<String>,
    ) {
        let update = QueueUpdate {
            user: user.clone(),
            job: job.clone(),
            status: status.as_str().to_string(),
            detail,
        };
        if let Err(err) = self.bus.publish(ControlEvent::QueueUpdate(update)).await {
            warn!(target: "scheduler", error = %err, "queue update not published");
        }
    }
}

#[async_trait]
impl QueueDrain for SchedulerQueues {
    /// Drops every pending job the user has, across all classes. Jobs
    /// already claimed by a worker are left to finish.
    async fn drain_user(&self, user: &UserId) -> Result<usize, PaceError> {
        let mut dropped = 0usize;
        for class in ActionClass::ALL {
            let mine = Arc::new(Mutex::new(Vec::<JobId>::new()));
            let mine_slot = Arc::clone(&mine);
            let owner = user.clone();
            self.store
                .update_typed::<Vec<QueueRef>, _>(&keys::queue(class), None, move |current| {
                    let mut index = current.unwrap_or_default();
                    index.retain(|entry| {
                        if entry.user == owner {
                            if let Ok(mut ids) = mine_slot.lock() {
                                ids.push(entry.job.clone());
                            }
                            false
                        } else {
                            true
                        }
                    });
                    Some(index)
                })
                .await?;
            let ids = mine.lock().map(|ids| ids.clone()).unwrap_or_default();
            for id in ids {
                let cancelled = self
                    .store
                    .update_typed::<QueueJob, _>(&keys::job(&id), Some(JOB_TTL), |current| {
                        current.map(|mut job| {
                            if job.status == JobStatus::Pending {
                                job.status = JobStatus::Cancelled;
                                job.error = Some("emergency stop".to_string());
                            }
                            job
                        })
                    })
                    .await?;
                if cancelled.map(|job| job.status == JobStatus::Cancelled).unwrap_or(false) {
                    dropped += 1;
                    self.publish_update(user, &id, JobStatus::Cancelled, Some("emergency stop".into()))
                        .await;
                }
            }
        }
        debug!(target: "scheduler", user = %user, dropped, "user queues drained");
        Ok(dropped)
    }
}
