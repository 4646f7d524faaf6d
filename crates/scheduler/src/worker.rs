use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pacekeeper_admission::AdmissionController;
use pacekeeper_core_types::{
    ActionClass, ActionOutcome, EndpointId, PaceError, Priority, UserId,
};
use pacekeeper_limits_center::LimitsCenter;

use crate::executor::{is_permanent_error, ActionExecutor, ContentProvider, TokenProvider};
use crate::model::{JobPayload, JobStatus, QueueJob};
use crate::pacing::{
    jittered_delay, lease_ttl, release_lease, stamp_processed, try_acquire_lease, PaceGate,
};
use crate::queue::SchedulerQueues;

/// Fallback defer horizon when a pre-flight deny has no retry estimate.
const DEFAULT_DEFER_SECS: i64 = 300;
/// Defer horizon when another process holds the lane lease.
const LEASE_BUSY_DEFER_SECS: i64 = 30;

/// Canonical endpoint each class's traffic is accounted against.
pub fn endpoint_for(class: ActionClass) -> EndpointId {
    let path = match class {
        ActionClass::Connection => "/invitation",
        ActionClass::Like => "/reaction",
        ActionClass::Comment => "/comment",
        ActionClass::ProfileView => "/profile/view",
        ActionClass::Follow => "/follow",
    };
    EndpointId::new(path)
}

/// Everything one worker loop needs; a single context is shared by all
/// five class workers.
pub struct WorkerContext {
    pub limits: Arc<dyn LimitsCenter>,
    pub admission: Arc<AdmissionController>,
    pub queues: Arc<SchedulerQueues>,
    pub gate: Arc<PaceGate>,
    pub executor: Arc<dyn ActionExecutor>,
    pub tokens: Arc<dyn TokenProvider>,
    pub content: Arc<dyn ContentProvider>,
    pub poll_interval: Duration,
}

/// One worker per action class. Each loop drains due jobs serially,
/// which combined with the pace gate keeps every lane at concurrency 1.
pub fn spawn_workers(
    ctx: Arc<WorkerContext>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    ActionClass::ALL
        .into_iter()
        .map(|class| {
            let ctx = Arc::clone(&ctx);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut rng = StdRng::from_entropy();
                let mut tick = tokio::time::interval(ctx.poll_interval);
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
                    loop {
                        match process_one(&ctx, class, &mut rng).await {
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(err) => {
                                warn!(target: "scheduler", %class, error = %err, "worker iteration failed");
                                break;
                            }
                        }
                    }
                }
                debug!(target: "scheduler", %class, "worker stopped");
            })
        })
        .collect()
}

/// Pops and runs at most one due job. Returns false when the queue had
/// nothing due.
pub async fn process_one(
    ctx: &WorkerContext,
    class: ActionClass,
    rng: &mut StdRng,
) -> Result<bool, PaceError> {
    let now = Utc::now();
    let Some(job) = ctx.queues.pop_due(class, now).await? else {
        return Ok(false);
    };
    let user = job.user.clone();
    let guard = ctx.gate.acquire(&user, class).await;

    // The enqueue-time check is stale by now; this one is authoritative.
    let decision = ctx.admission.validate(&user, &endpoint_for(class)).await;
    if !decision.allowed {
        let until = now
            + ChronoDuration::seconds(
                decision.retry_after_secs.map(|secs| secs as i64).unwrap_or(DEFAULT_DEFER_SECS),
            );
        debug!(
            target: "scheduler",
            job = %job.id,
            reason = decision.reason.as_deref().unwrap_or("denied"),
            until = %until,
            "pre-flight deny, deferring"
        );
        ctx.queues.defer(&job.id, until).await?;
        return Ok(true);
    }

    // The in-process gate is not enough when several worker processes
    // share one store; the lane lease arbitrates between them.
    let store = Arc::clone(ctx.admission.store());
    let ttl = lease_ttl(ctx.limits.snapshot().pacing.for_class(class));
    let Some(lease) = try_acquire_lease(store.as_ref(), &user, class, ttl).await? else {
        debug!(target: "scheduler", job = %job.id, user = %user, %class, "lane leased elsewhere");
        ctx.queues
            .defer(&job.id, now + ChronoDuration::seconds(LEASE_BUSY_DEFER_SECS))
            .await?;
        return Ok(true);
    };

    let ran = run_claimed(ctx, &job, class, rng).await;
    if let Err(err) = release_lease(store.as_ref(), &user, class, lease).await {
        warn!(target: "scheduler", user = %user, %class, error = %err, "lease release failed");
    }
    drop(guard);
    ran?;
    Ok(true)
}

/// Runs one claimed job to a terminal or requeued state. The caller
/// holds both the in-process gate and the store lease for the duration,
/// including the trailing inter-action delay.
async fn run_claimed(
    ctx: &WorkerContext,
    job: &QueueJob,
    class: ActionClass,
    rng: &mut StdRng,
) -> Result<(), PaceError> {
    let user = job.user.clone();
    let token = match ctx.tokens.access_token(&user).await {
        Ok(token) => token,
        Err(PaceError::NotFound(detail)) => {
            // No credentials is permanent; retrying cannot help.
            ctx.queues
                .transition(&job.id, JobStatus::Failed, Some(detail), None, None)
                .await?;
            return Ok(());
        }
        Err(err) => {
            handle_failure(ctx, job, err.to_string()).await?;
            return Ok(());
        }
    };

    let payload = resolve_payload(ctx, &user, job.payload.clone()).await;
    let result = ctx.executor.execute(&user, class, &payload, &token).await;

    // The outcome is logged even when the job will be retried, so the
    // safety score tracks every real attempt.
    let outcome = ActionOutcome::new(
        user.clone(),
        class,
        endpoint_for(class),
        result.success,
        result.status_code,
        result.latency_ms,
    );
    if let Err(err) = ctx.admission.log_outcome(outcome).await {
        warn!(target: "scheduler", job = %job.id, error = %err, "outcome not logged");
    }

    if result.success {
        ctx.queues
            .transition(&job.id, JobStatus::Completed, None, None, None)
            .await?;
        stamp_processed(ctx.admission.store().as_ref(), &user, class, Utc::now()).await?;
        info!(target: "scheduler", job = %job.id, user = %user, %class, "job completed");

        // Hold the lane for the inter-action delay so the next job of
        // this class cannot start immediately after.
        let snapshot = ctx.limits.snapshot();
        let delay = jittered_delay(
            snapshot.pacing.for_class(class),
            snapshot.pacing.jitter_pct,
            rng,
        );
        tokio::time::sleep(delay).await;
    } else {
        let detail = result
            .error
            .unwrap_or_else(|| format!("http {}", result.status_code));
        handle_failure(ctx, job, detail).await?;
    }
    Ok(())
}

/// Retry policy: permanent errors and exhausted retries fail the job
/// terminally; everything else requeues at low priority with an
/// exponential backoff.
async fn handle_failure(
    ctx: &WorkerContext,
    job: &QueueJob,
    detail: String,
) -> Result<(), PaceError> {
    let permanent = is_permanent_error(&detail);
    let retries_left = job.retry_count < job.max_retries;
    if permanent || !retries_left {
        warn!(
            target: "scheduler",
            job = %job.id,
            user = %job.user,
            permanent,
            error = %detail,
            "job failed terminally"
        );
        ctx.queues
            .transition(&job.id, JobStatus::Failed, Some(detail), None, None)
            .await?;
        return Ok(());
    }

    let attempt = job.retry_count + 1;
    let backoff_ms = ctx.limits.snapshot().retry.backoff_base_ms.saturating_mul(1 << attempt);
    let retry_at = Utc::now() + ChronoDuration::milliseconds(backoff_ms as i64);
    debug!(
        target: "scheduler",
        job = %job.id,
        attempt,
        retry_at = %retry_at,
        error = %detail,
        "job requeued for retry"
    );
    ctx.queues
        .transition(
            &job.id,
            JobStatus::Pending,
            Some(detail),
            Some(retry_at),
            Some(Priority::Low),
        )
        .await?;
    Ok(())
}

/// Fills in resolver-provided text, falling back to whatever the
/// payload already carries.
async fn resolve_payload(ctx: &WorkerContext, user: &UserId, payload: JobPayload) -> JobPayload {
    match payload {
        JobPayload::Comment { target_post, text } => {
            let resolved = ctx
                .content
                .resolve_text(
                    user,
                    &JobPayload::Comment {
                        target_post: target_post.clone(),
                        text: text.clone(),
                    },
                )
                .await
                .or(text);
            JobPayload::Comment {
                target_post,
                text: resolved,
            }
        }
        JobPayload::Connection {
            target_profile,
            note,
        } => {
            let resolved = ctx
                .content
                .resolve_text(
                    user,
                    &JobPayload::Connection {
                        target_profile: target_profile.clone(),
                        note: note.clone(),
                    },
                )
                .await
                .or(note);
            JobPayload::Connection {
                target_profile,
                note: resolved,
            }
        }
        other => other,
    }
}
