//! Outbound event contract for the control plane.
//!
//! Delivery is at-least-once and consumers are expected to be
//! idempotent; nothing in the core relies on listener ordering for
//! correctness.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use pacekeeper_core_types::{
    EmergencyStopRecord, JobId, PaceError, SafetyAlert, UserId,
};

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), PaceError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Queue state transition surfaced on `queue_updates:{user}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueUpdate {
    pub user: UserId,
    pub job: JobId,
    pub status: String,
    pub detail: Option<String>,
}

/// Control-plane event with its logical topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ControlEvent {
    SafetyAlert(SafetyAlert),
    EmergencyStopTriggered(EmergencyStopRecord),
    EmergencyStopResumed { user: UserId, resumed_by: String },
    QueueUpdate(QueueUpdate),
}

impl ControlEvent {
    pub fn topic(&self) -> String {
        match self {
            ControlEvent::SafetyAlert(alert) => format!("safety_alerts:{}", alert.user),
            ControlEvent::EmergencyStopTriggered(_) | ControlEvent::EmergencyStopResumed { .. } => {
                "emergency_stops".to_string()
            }
            ControlEvent::QueueUpdate(update) => format!("queue_updates:{}", update.user),
        }
    }
}

/// Simple in-memory bus suitable for unit tests and single-process
/// deployments; an external broker implementation slots in behind the
/// same trait.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), PaceError> {
        // A bus with no subscribers is not an error; events are
        // best-effort notifications to outside surfaces.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Helper to materialise an mpsc receiver from the bus subscription so
/// callers can await events without handling broadcast lag directly.
pub fn to_mpsc<E>(bus: Arc<InMemoryBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Ok(ev) = rx.recv().await {
            if tx.send(ev).await.is_err() {
                break;
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacekeeper_core_types::{AlertCategory, Severity};

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = InMemoryBus::<ControlEvent>::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let user = UserId::new();
        let alert = SafetyAlert::new(
            user.clone(),
            Severity::Critical,
            AlertCategory::ApiError,
            "circuit breaker opened",
        );
        bus.publish(ControlEvent::SafetyAlert(alert)).await.unwrap();

        let first = rx1.recv().await.unwrap();
        let second = rx2.recv().await.unwrap();
        assert_eq!(first.topic(), format!("safety_alerts:{user}"));
        assert_eq!(first.topic(), second.topic());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = InMemoryBus::<ControlEvent>::new(4);
        let update = QueueUpdate {
            user: UserId::new(),
            job: JobId::new(),
            status: "pending".into(),
            detail: None,
        };
        assert!(bus.publish(ControlEvent::QueueUpdate(update)).await.is_ok());
    }

    #[tokio::test]
    async fn stop_events_share_the_global_topic() {
        use pacekeeper_core_types::{StopReason, StopReasonKind};
        let record = EmergencyStopRecord::new(
            UserId::new(),
            StopReason::categorized(StopReasonKind::RateLimit, "too many 429s"),
            "monitor",
        );
        assert_eq!(
            ControlEvent::EmergencyStopTriggered(record).topic(),
            "emergency_stops"
        );
    }
}
