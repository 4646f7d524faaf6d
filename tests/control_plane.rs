//! End-to-end tests over the assembled service: enqueue through
//! execution, outcome logging, safety escalation and emergency stops.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;

use pacekeeper::{
    ActionClass, DefaultContent, JobPayload, JobStatus, NoopExecutor, PaceKeeper, PaceKeeperConfig,
    Priority, StaticTokens, UserId,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pacekeeper=debug,scheduler=debug")
        .with_test_writer()
        .try_init();
}

/// Overlay shrinking every pacing delay so tests run in milliseconds.
fn fast_limits_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp limits file");
    let overlay = r#"
pacing:
  connection: { min_delay_ms: 1, max_delay_ms: 2 }
  like: { min_delay_ms: 1, max_delay_ms: 2 }
  comment: { min_delay_ms: 1, max_delay_ms: 2 }
  profile_view: { min_delay_ms: 1, max_delay_ms: 2 }
  follow: { min_delay_ms: 1, max_delay_ms: 2 }
"#;
    file.write_all(overlay.as_bytes()).expect("write overlay");
    file
}

fn start_service(limits: &NamedTempFile, user: &UserId) -> Arc<PaceKeeper> {
    init_tracing();
    let config = PaceKeeperConfig {
        limits_path: Some(limits.path().to_path_buf()),
        queue_poll_interval: Duration::from_millis(25),
        safety_eval_interval: Duration::from_secs(3600),
        resume_sweep_interval: Duration::from_secs(3600),
        ..PaceKeeperConfig::default()
    };
    PaceKeeper::start(
        config,
        Arc::new(NoopExecutor),
        Arc::new(StaticTokens::new().with_token(user.clone(), "test-token")),
        Arc::new(DefaultContent),
    )
    .expect("service starts")
}

async fn wait_for_status(
    service: &PaceKeeper,
    job: &pacekeeper::JobId,
    wanted: JobStatus,
) -> JobStatus {
    for _ in 0..100 {
        let current = service
            .queues()
            .job(job)
            .await
            .expect("job lookup")
            .expect("job exists")
            .status;
        if current == wanted {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    service
        .queues()
        .job(job)
        .await
        .expect("job lookup")
        .expect("job exists")
        .status
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueued_job_executes_and_is_accounted() {
    let limits = fast_limits_file();
    let user = UserId::new();
    let service = start_service(&limits, &user);
    service.enable_automation(&user).await.unwrap();

    let job = service
        .scheduler()
        .enqueue(
            &user,
            JobPayload::Like {
                target_post: "post-1".into(),
            },
            Priority::Normal,
            Some(chrono::Utc::now()),
        )
        .await
        .unwrap();

    let status = wait_for_status(&service, &job, JobStatus::Completed).await;
    assert_eq!(status, JobStatus::Completed);

    let metrics = service.compliance_metrics(&user).await.unwrap();
    assert_eq!(metrics.day_total, 1);
    let likes = metrics
        .daily_limits
        .iter()
        .find(|usage| usage.class == ActionClass::Like)
        .unwrap();
    assert_eq!(likes.used, 1);
    assert!(metrics.account_health.score >= 80);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn emergency_stop_cancels_pending_work_and_blocks_new_work() {
    use pacekeeper::{to_mpsc, ControlEvent, StopReason, StopReasonKind};

    let limits = fast_limits_file();
    let user = UserId::new();
    let service = start_service(&limits, &user);
    service.enable_automation(&user).await.unwrap();
    let mut events = to_mpsc(Arc::clone(service.bus()), 32);

    // Scheduled far enough out that the worker cannot claim it first.
    let job = service
        .scheduler()
        .enqueue(
            &user,
            JobPayload::Comment {
                target_post: "post-9".into(),
                text: None,
            },
            Priority::Normal,
            Some(chrono::Utc::now() + chrono::Duration::hours(1)),
        )
        .await
        .unwrap();

    service
        .admin()
        .trigger_emergency_stop(
            &user,
            StopReason::categorized(StopReasonKind::SuspiciousActivity, "manual review"),
            "operator",
        )
        .await
        .unwrap();

    let cancelled = service.queues().job(&job).await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    // The stop was broadcast on the global topic.
    let stop_event = loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("stop event within deadline")
            .expect("bus still open");
        if matches!(event, ControlEvent::EmergencyStopTriggered(_)) {
            break event;
        }
    };
    assert_eq!(stop_event.topic(), "emergency_stops");

    let decision = service
        .admission()
        .validate(&user, &pacekeeper::EndpointId::new("/comment"))
        .await;
    assert!(!decision.allowed);

    let err = service
        .scheduler()
        .enqueue(
            &user,
            JobPayload::Like {
                target_post: "post-2".into(),
            },
            Priority::Normal,
            None,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("suspended"));

    // An operator resume restores admission.
    service
        .admin()
        .resume(&user, "operator", "cleared after review")
        .await
        .unwrap();
    let decision = service
        .admission()
        .validate(&user, &pacekeeper::EndpointId::new("/comment"))
        .await;
    assert!(decision.allowed);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_failures_escalate_to_suspension() {
    use pacekeeper::{ActionOutcome, EndpointId, OverallStatus};

    let limits = fast_limits_file();
    let user = UserId::new();
    let service = start_service(&limits, &user);
    service.enable_automation(&user).await.unwrap();

    // Outcomes flow admission -> safety monitor -> emergency stop
    // synchronously; three straight failures cross the
    // consecutive-failure threshold.
    for _ in 0..3 {
        let outcome = ActionOutcome::new(
            user.clone(),
            ActionClass::ProfileView,
            EndpointId::new("/profile/view"),
            false,
            500,
            120,
        );
        service.admission().log_outcome(outcome).await.unwrap();
    }

    let status = service.monitor().status(&user).await.unwrap();
    assert!(matches!(
        status.status,
        OverallStatus::Critical | OverallStatus::Suspended
    ));
    assert!(!status.automation_enabled);

    let record = service.coordinator().status(&user).await.unwrap();
    assert!(record.is_some(), "escalation must have suspended the user");

    let decision = service
        .admission()
        .validate(&user, &EndpointId::new("/reaction"))
        .await;
    assert!(!decision.allowed);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn system_wide_stop_suspends_every_automating_user() {
    use pacekeeper::{StopReason, StopReasonKind};

    let limits = fast_limits_file();
    let operator_user = UserId::new();
    let service = start_service(&limits, &operator_user);

    let users = vec![UserId::new(), UserId::new()];
    for user in &users {
        service.enable_automation(user).await.unwrap();
    }

    let stopped = service
        .admin()
        .trigger_system_wide_emergency_stop(
            StopReason::categorized(StopReasonKind::SystemOverload, "platform incident"),
            "operator",
            None,
        )
        .await
        .unwrap();
    assert_eq!(stopped, 2);

    // Even a user outside the roster is blocked by the sentinel.
    let outsider = UserId::new();
    let decision = service
        .admission()
        .validate(&outsider, &pacekeeper::EndpointId::new("/reaction"))
        .await;
    assert!(!decision.allowed);

    service.admin().resume_system_wide("operator").await.unwrap();
    let decision = service
        .admission()
        .validate(&outsider, &pacekeeper::EndpointId::new("/reaction"))
        .await;
    assert!(decision.allowed);

    service.shutdown().await;
}
