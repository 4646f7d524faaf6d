use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use pacekeeper_core_types::{ActionClass, ActionOutcome, UserId};
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt, StoreError};

/// How long the rolling log is kept; feeds both windows and heuristics.
const LOG_RETENTION_HOURS: i64 = 24;
/// Hard cap so one pathological user cannot grow the record unboundedly.
const LOG_MAX_ENTRIES: usize = 2_000;
/// Store TTL for the outcome log key.
const LOG_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Compact per-attempt record kept in the rolling outcome log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub class: ActionClass,
    pub endpoint: String,
    pub success: bool,
    pub status_code: u16,
}

impl From<&ActionOutcome> for LogEntry {
    fn from(outcome: &ActionOutcome) -> Self {
        Self {
            ts: outcome.timestamp,
            class: outcome.class,
            endpoint: outcome.endpoint.0.clone(),
            success: outcome.success,
            status_code: outcome.status_code,
        }
    }
}

/// Appends one outcome to the user's rolling log, pruning entries that
/// fell outside the retention horizon. One atomic update per append.
pub async fn append_outcome(
    store: &dyn CounterStore,
    outcome: &ActionOutcome,
) -> Result<(), StoreError> {
    let entry = LogEntry::from(outcome);
    let key = keys::outcomes(&outcome.user);
    store
        .update_typed::<Vec<LogEntry>, _>(&key, Some(LOG_TTL), move |current| {
            let horizon = entry.ts - ChronoDuration::hours(LOG_RETENTION_HOURS);
            let mut log = current.unwrap_or_default();
            log.retain(|existing| existing.ts > horizon);
            log.push(entry);
            if log.len() > LOG_MAX_ENTRIES {
                let excess = log.len() - LOG_MAX_ENTRIES;
                log.drain(..excess);
            }
            Some(log)
        })
        .await?;
    Ok(())
}

pub async fn load_entries(
    store: &dyn CounterStore,
    user: &UserId,
) -> Result<Vec<LogEntry>, StoreError> {
    Ok(store
        .get_typed::<Vec<LogEntry>>(&keys::outcomes(user))
        .await?
        .unwrap_or_default())
}

/// Windowed counts derived from a single outcome log, which makes
/// minute <= hour <= day hold by construction.
#[derive(Clone, Debug, Default)]
pub struct ActivityWindows {
    pub minute: u32,
    /// Count in the minute before the current one; zero here means the
    /// current minute is a fresh burst after idle time.
    pub prev_minute: u32,
    pub hour: u32,
    pub day: u32,
    day_entries: Vec<(ActionClass, bool)>,
}

impl ActivityWindows {
    pub fn from_entries(entries: &[LogEntry], now: DateTime<Utc>) -> Self {
        let minute_floor = now - ChronoDuration::seconds(60);
        let prev_minute_floor = now - ChronoDuration::seconds(120);
        let hour_floor = now - ChronoDuration::seconds(3600);
        let day_floor = local_midnight_utc(now);

        let mut windows = ActivityWindows::default();
        for entry in entries {
            if entry.ts > now {
                continue;
            }
            if entry.ts >= day_floor {
                windows.day += 1;
                windows.day_entries.push((entry.class, entry.success));
            }
            if entry.ts > hour_floor {
                windows.hour += 1;
            }
            if entry.ts > minute_floor {
                windows.minute += 1;
            } else if entry.ts > prev_minute_floor {
                windows.prev_minute += 1;
            }
        }
        windows
    }

    pub fn day_count_for(&self, class: ActionClass) -> u32 {
        self.day_entries
            .iter()
            .filter(|(entry_class, _)| *entry_class == class)
            .count() as u32
    }
}

/// Start of the current local day expressed in UTC; the day window and
/// its retry horizon reset at local midnight.
pub fn local_midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    let midnight = local.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default();
    match Local.from_local_datetime(&midnight) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.with_timezone(&Utc)
        }
        chrono::LocalResult::None => now,
    }
}

pub fn seconds_to_local_midnight(now: DateTime<Utc>) -> u64 {
    let next_midnight = local_midnight_utc(now) + ChronoDuration::days(1);
    (next_midnight - now).num_seconds().max(1) as u64
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pacekeeper_core_types::EndpointId;
    use pacekeeper_counter_store::MemoryStore;

    fn entry(age_secs: i64, class: ActionClass, success: bool) -> LogEntry {
        LogEntry {
            ts: Utc::now() - ChronoDuration::seconds(age_secs),
            class,
            endpoint: "/test".into(),
            success,
            status_code: if success { 200 } else { 500 },
        }
    }

    #[test]
    fn counts_are_monotone_across_windows() {
        let now = Utc::now();
        let entries = vec![
            entry(10, ActionClass::Like, true),
            entry(90, ActionClass::Like, true),
            entry(3_000, ActionClass::Connection, true),
            entry(30_000, ActionClass::Connection, false),
        ];
        let windows = ActivityWindows::from_entries(&entries, now);
        assert!(windows.minute <= windows.hour);
        assert!(windows.hour <= windows.day);
        assert_eq!(windows.minute, 1);
        assert_eq!(windows.prev_minute, 1);
        assert_eq!(windows.hour, 3);
    }

    #[test]
    fn class_counts_partition_the_day() {
        let now = Utc::now();
        let entries = vec![
            entry(5, ActionClass::Connection, true),
            entry(15, ActionClass::Connection, true),
            entry(25, ActionClass::Like, true),
        ];
        let windows = ActivityWindows::from_entries(&entries, now);
        assert_eq!(windows.day_count_for(ActionClass::Connection), 2);
        assert_eq!(windows.day_count_for(ActionClass::Like), 1);
        assert_eq!(windows.day_count_for(ActionClass::Follow), 0);
    }

    #[test]
    fn midnight_horizon_is_in_the_future() {
        let secs = seconds_to_local_midnight(Utc::now());
        assert!(secs >= 1);
        assert!(secs <= 24 * 3600);
    }

    #[tokio::test]
    async fn append_prunes_stale_entries() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();

        // Seed a stale entry directly, then append a fresh outcome.
        let stale = vec![entry(30 * 3600, ActionClass::Like, true)];
        store
            .put_typed(&keys::outcomes(&user), &stale, None)
            .await
            .unwrap();

        let outcome = ActionOutcome::new(
            user.clone(),
            ActionClass::Like,
            EndpointId::new("/reaction"),
            true,
            200,
            120,
        );
        append_outcome(store.as_ref(), &outcome).await.unwrap();

        let log = load_entries(store.as_ref(), &user).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].endpoint, "/reaction");
    }
}
