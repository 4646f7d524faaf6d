//! Humanlike pacing: randomized inter-action delays and the per
//! (user, class) exclusivity that keeps each lane serialized.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::{rngs::StdRng, Rng};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use pacekeeper_core_types::{ActionClass, UserId};
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt, StoreError};
use pacekeeper_limits_center::PacingRule;

const PACE_TTL: Duration = Duration::from_secs(48 * 3600);
/// Headroom past the longest configured delay before a lease record is
/// considered abandoned.
const LEASE_GRACE: Duration = Duration::from_secs(60);

/// Delay drawn uniformly from [min, max], then jittered by up to
/// `jitter_pct` in either direction, floored at the configured minimum.
pub fn jittered_delay(rule: &PacingRule, jitter_pct: f64, rng: &mut StdRng) -> Duration {
    let base = if rule.max_delay_ms > rule.min_delay_ms {
        rng.gen_range(rule.min_delay_ms..=rule.max_delay_ms)
    } else {
        rule.min_delay_ms
    };
    let jitter = rng.gen_range(-jitter_pct..=jitter_pct);
    let drawn = (base as f64 * (1.0 + jitter)) as u64;
    Duration::from_millis(drawn.max(rule.min_delay_ms))
}

/// Timestamp of the last processed job for this lane, used by the
/// enqueue-time minimum-gap check.
pub async fn last_processed(
    store: &dyn CounterStore,
    user: &UserId,
    class: ActionClass,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    store.get_typed(&keys::pace(user, class)).await
}

pub async fn stamp_processed(
    store: &dyn CounterStore,
    user: &UserId,
    class: ActionClass,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    store
        .put_typed(&keys::pace(user, class), &at, Some(PACE_TTL))
        .await
}

/// Proof of lane ownership; surrendered back through [`release_lease`].
pub struct LaneLease {
    token: String,
    ttl: Duration,
}

/// TTL covering execution plus the longest possible inter-action delay,
/// so a crashed holder cannot wedge the lane forever.
pub fn lease_ttl(rule: &PacingRule) -> Duration {
    Duration::from_millis(rule.max_delay_ms) + LEASE_GRACE
}

/// Claims the store-backed (user, class) lane. Workers in other
/// processes sharing the store contend on the same key, so at most one
/// of them runs the lane at a time. `None` means someone else holds it.
pub async fn try_acquire_lease(
    store: &dyn CounterStore,
    user: &UserId,
    class: ActionClass,
    ttl: Duration,
) -> Result<Option<LaneLease>, StoreError> {
    let token = Uuid::new_v4().to_string();
    let claimed = token.clone();
    let stored = store
        .update_typed::<String, _>(&keys::lease(user, class), Some(ttl), move |current| {
            match current {
                Some(holder) => Some(holder),
                None => Some(claimed),
            }
        })
        .await?;
    Ok(match stored {
        Some(holder) if holder == token => Some(LaneLease { token, ttl }),
        _ => None,
    })
}

/// Releases the lane only if this lease still owns it; a holder whose
/// lease expired and was re-claimed must not evict the new owner. The
/// write re-arms the TTL either way, which only ever extends it.
pub async fn release_lease(
    store: &dyn CounterStore,
    user: &UserId,
    class: ActionClass,
    lease: LaneLease,
) -> Result<(), StoreError> {
    let ttl = lease.ttl;
    store
        .update_typed::<String, _>(&keys::lease(user, class), Some(ttl), move |current| {
            match current {
                Some(holder) if holder == lease.token => None,
                other => other,
            }
        })
        .await?;
    Ok(())
}

/// One mutex per (user, class). The worker holds the guard for the
/// job's full execution plus its inter-action delay, which is what
/// actually enforces concurrency 1 per lane.
#[derive(Default)]
pub struct PaceGate {
    locks: DashMap<(UserId, ActionClass), Arc<Mutex<()>>>,
}

impl PaceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user: &UserId, class: ActionClass) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry((user.clone(), class))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn delays_stay_within_the_jittered_envelope() {
        let rule = PacingRule {
            min_delay_ms: 1_000,
            max_delay_ms: 2_000,
            max_per_hour: 10,
            max_per_day: 100,
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let delay = jittered_delay(&rule, 0.25, &mut rng);
            assert!(delay >= Duration::from_millis(1_000), "floored at min");
            assert!(delay <= Duration::from_millis(2_500), "max plus jitter");
        }
    }

    #[test]
    fn degenerate_range_still_yields_the_minimum() {
        let rule = PacingRule {
            min_delay_ms: 500,
            max_delay_ms: 500,
            max_per_hour: 10,
            max_per_day: 100,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let delay = jittered_delay(&rule, 0.25, &mut rng);
        assert!(delay >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn lease_excludes_other_holders_until_released() {
        use pacekeeper_counter_store::MemoryStore;

        let store = MemoryStore::new();
        let user = UserId::new();
        let ttl = Duration::from_secs(30);

        let first = try_acquire_lease(&store, &user, ActionClass::Like, ttl)
            .await
            .unwrap()
            .expect("free lane is claimable");
        assert!(try_acquire_lease(&store, &user, ActionClass::Like, ttl)
            .await
            .unwrap()
            .is_none());
        // Another lane is unaffected.
        assert!(try_acquire_lease(&store, &user, ActionClass::Comment, ttl)
            .await
            .unwrap()
            .is_some());

        release_lease(&store, &user, ActionClass::Like, first)
            .await
            .unwrap();
        assert!(try_acquire_lease(&store, &user, ActionClass::Like, ttl)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn stale_release_does_not_evict_the_new_holder() {
        use pacekeeper_counter_store::{keys, MemoryStore};

        let store = MemoryStore::new();
        let user = UserId::new();
        let ttl = Duration::from_secs(30);

        let stale = try_acquire_lease(&store, &user, ActionClass::Like, ttl)
            .await
            .unwrap()
            .unwrap();
        // Simulate expiry of the first lease and a re-claim.
        store
            .delete(&keys::lease(&user, ActionClass::Like))
            .await
            .unwrap();
        let _current = try_acquire_lease(&store, &user, ActionClass::Like, ttl)
            .await
            .unwrap()
            .unwrap();

        release_lease(&store, &user, ActionClass::Like, stale)
            .await
            .unwrap();
        assert!(
            try_acquire_lease(&store, &user, ActionClass::Like, ttl)
                .await
                .unwrap()
                .is_none(),
            "the re-claimed lease must survive a stale release"
        );
    }

    #[tokio::test]
    async fn gate_serializes_one_lane_but_not_others() {
        let gate = PaceGate::new();
        let user = UserId::new();

        let held = gate.acquire(&user, ActionClass::Like).await;
        // A different lane for the same user is independent.
        let _other = gate.acquire(&user, ActionClass::Comment).await;

        let same_lane = gate.locks.get(&(user.clone(), ActionClass::Like)).unwrap().clone();
        assert!(same_lane.try_lock().is_err());
        drop(held);
        assert!(same_lane.try_lock().is_ok());
    }
}
