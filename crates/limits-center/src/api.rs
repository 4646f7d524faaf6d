use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use pacekeeper_core_types::UserId;
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt};

use crate::errors::LimitsError;
use crate::model::{EffectiveLimits, LimitsSnapshot, UserOverride};

#[async_trait]
pub trait LimitsCenter: Send + Sync {
    /// Current process-wide snapshot; cheap to call on every decision.
    fn snapshot(&self) -> Arc<LimitsSnapshot>;

    /// Window and class ceilings with one user's overrides applied.
    async fn for_user(&self, user: &UserId) -> Result<EffectiveLimits, LimitsError>;

    /// Admin operation: partially shadow a user's ceilings. Fields left
    /// `None` keep their previous value.
    async fn set_user_limits(
        &self,
        user: &UserId,
        partial: UserOverride,
    ) -> Result<(), LimitsError>;

    fn subscribe(&self) -> watch::Receiver<Arc<LimitsSnapshot>>;
}

/// Snapshot held in an `ArcSwap`; per-user overrides live in the
/// counter store so every process sees the same shadowing.
pub struct InMemoryLimitsCenter {
    snapshot: ArcSwap<LimitsSnapshot>,
    store: Arc<dyn CounterStore>,
    watch_tx: watch::Sender<Arc<LimitsSnapshot>>,
}

impl InMemoryLimitsCenter {
    pub fn new(snapshot: LimitsSnapshot, store: Arc<dyn CounterStore>) -> Self {
        let current = Arc::new(snapshot);
        let (watch_tx, _watch_rx) = watch::channel(Arc::clone(&current));
        Self {
            snapshot: ArcSwap::new(current),
            store,
            watch_tx,
        }
    }

    /// Swap in a new process-wide snapshot (e.g. after a reload).
    pub fn replace_snapshot(&self, mut snapshot: LimitsSnapshot) {
        snapshot.rev = self.snapshot.load().rev.saturating_add(1);
        let next = Arc::new(snapshot);
        self.snapshot.store(Arc::clone(&next));
        let _ = self.watch_tx.send(next);
    }
}

#[async_trait]
impl LimitsCenter for InMemoryLimitsCenter {
    fn snapshot(&self) -> Arc<LimitsSnapshot> {
        self.snapshot.load_full()
    }

    async fn for_user(&self, user: &UserId) -> Result<EffectiveLimits, LimitsError> {
        let over: Option<UserOverride> = self
            .store
            .get_typed(&keys::limits_override(user))
            .await
            .map_err(|err| LimitsError::Store(err.to_string()))?;
        Ok(EffectiveLimits::resolve(
            &self.snapshot.load(),
            over.as_ref(),
        ))
    }

    async fn set_user_limits(
        &self,
        user: &UserId,
        partial: UserOverride,
    ) -> Result<(), LimitsError> {
        let key = keys::limits_override(user);
        self.store
            .update_typed::<UserOverride, _>(&key, None, move |current| {
                let mut merged = current.unwrap_or_default();
                merged.merge(&partial);
                Some(merged)
            })
            .await
            .map_err(|err| LimitsError::Store(err.to_string()))?;
        info!(target: "limits_center", user = %user, "user limits override updated");
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Arc<LimitsSnapshot>> {
        self.watch_tx.subscribe()
    }
}
