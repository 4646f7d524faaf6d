use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use pacekeeper_admission::AlertSink;
use pacekeeper_core_types::{AlertId, PaceError, SafetyAlert, UserId};
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt};
use pacekeeper_event_bus::{ControlEvent, EventBus};

/// Alerts kept per user; resolved ones age out with the record.
const ALERT_CAP: usize = 100;
const ALERT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Store-backed alert registry with (category, message) de-duplication:
/// while an unresolved alert with the same key exists, raising it again
/// is a no-op.
pub struct AlertCenter {
    store: Arc<dyn CounterStore>,
    bus: Arc<dyn EventBus<ControlEvent>>,
}

impl AlertCenter {
    pub fn new(store: Arc<dyn CounterStore>, bus: Arc<dyn EventBus<ControlEvent>>) -> Self {
        Self { store, bus }
    }

    /// Returns true when the alert was actually created.
    pub async fn raise_alert(&self, alert: SafetyAlert) -> Result<bool, PaceError> {
        let key = keys::alerts(&alert.user);
        let dedup = alert.dedup_key();
        let published = alert.clone();
        let created = Arc::new(Mutex::new(false));
        let created_flag = Arc::clone(&created);
        self.store
            .update_typed::<Vec<SafetyAlert>, _>(&key, Some(ALERT_TTL), move |current| {
                let mut alerts = current.unwrap_or_default();
                let duplicate = alerts
                    .iter()
                    .any(|existing| !existing.resolved && existing.dedup_key() == dedup);
                if !duplicate {
                    alerts.push(alert);
                    if alerts.len() > ALERT_CAP {
                        let excess = alerts.len() - ALERT_CAP;
                        alerts.drain(..excess);
                    }
                    if let Ok(mut flag) = created_flag.lock() {
                        *flag = true;
                    }
                }
                Some(alerts)
            })
            .await?;

        let created = created.lock().map(|flag| *flag).unwrap_or(false);
        if created {
            info!(
                target: "safety_monitor",
                user = %published.user,
                severity = %published.severity,
                message = %published.message,
                "alert raised"
            );
            self.bus.publish(ControlEvent::SafetyAlert(published)).await?;
        }
        Ok(created)
    }

    pub async fn active(&self, user: &UserId) -> Result<Vec<SafetyAlert>, PaceError> {
        let alerts: Vec<SafetyAlert> = self
            .store
            .get_typed(&keys::alerts(user))
            .await?
            .unwrap_or_default();
        Ok(alerts.into_iter().filter(|alert| !alert.resolved).collect())
    }

    /// Marks one alert resolved; false when no unresolved alert with
    /// that id exists.
    pub async fn resolve(&self, user: &UserId, id: &AlertId) -> Result<bool, PaceError> {
        let id = id.clone();
        let resolved = Arc::new(Mutex::new(false));
        let resolved_flag = Arc::clone(&resolved);
        self.store
            .update_typed::<Vec<SafetyAlert>, _>(&keys::alerts(user), Some(ALERT_TTL), move |current| {
                let mut alerts = current.unwrap_or_default();
                for alert in alerts.iter_mut() {
                    if alert.id == id && !alert.resolved {
                        alert.resolved = true;
                        if let Ok(mut flag) = resolved_flag.lock() {
                            *flag = true;
                        }
                    }
                }
                Some(alerts)
            })
            .await?;
        Ok(resolved.lock().map(|flag| *flag).unwrap_or(false))
    }

    /// Resolves everything outstanding for a user, e.g. after an
    /// operator-approved resume.
    pub async fn resolve_all(&self, user: &UserId) -> Result<(), PaceError> {
        self.store
            .update_typed::<Vec<SafetyAlert>, _>(&keys::alerts(user), Some(ALERT_TTL), |current| {
                let mut alerts = current.unwrap_or_default();
                for alert in alerts.iter_mut() {
                    alert.resolved = true;
                }
                Some(alerts)
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AlertSink for AlertCenter {
    async fn raise(&self, alert: SafetyAlert) {
        if let Err(err) = self.raise_alert(alert).await {
            warn!(target: "safety_monitor", error = %err, "alert could not be recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacekeeper_core_types::{AlertCategory, Severity};
    use pacekeeper_counter_store::MemoryStore;
    use pacekeeper_event_bus::InMemoryBus;

    fn center() -> AlertCenter {
        AlertCenter::new(
            Arc::new(MemoryStore::new()),
            InMemoryBus::<ControlEvent>::new(16),
        )
    }

    fn alert(user: &UserId, message: &str) -> SafetyAlert {
        SafetyAlert::new(
            user.clone(),
            Severity::Warning,
            AlertCategory::AccountHealth,
            message,
        )
    }

    #[tokio::test]
    async fn duplicate_unresolved_alerts_are_not_recreated() {
        let center = center();
        let user = UserId::new();

        assert!(center.raise_alert(alert(&user, "elevated error rate")).await.unwrap());
        assert!(!center.raise_alert(alert(&user, "elevated error rate")).await.unwrap());
        assert_eq!(center.active(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolution_allows_the_alert_to_fire_again() {
        let center = center();
        let user = UserId::new();

        center.raise_alert(alert(&user, "elevated error rate")).await.unwrap();
        let id = center.active(&user).await.unwrap()[0].id.clone();
        assert!(center.resolve(&user, &id).await.unwrap());
        assert!(center.active(&user).await.unwrap().is_empty());

        assert!(center.raise_alert(alert(&user, "elevated error rate")).await.unwrap());
    }

    #[tokio::test]
    async fn raising_publishes_to_the_bus() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let bus = InMemoryBus::<ControlEvent>::new(16);
        let center = AlertCenter::new(store, Arc::clone(&bus) as Arc<dyn EventBus<ControlEvent>>);
        let mut rx = bus.subscribe();

        let user = UserId::new();
        center.raise_alert(alert(&user, "pattern anomaly")).await.unwrap();
        match rx.recv().await.unwrap() {
            ControlEvent::SafetyAlert(published) => assert_eq!(published.user, user),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
