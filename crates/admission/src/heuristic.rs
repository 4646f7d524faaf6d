//! Behavioral risk heuristics over the rolling outcome log.
//!
//! These are coarse pattern detectors, not a model: sustained volume,
//! machine-gun bursts and elevated error ratios are the signals the
//! platform itself reacts to first.

use chrono::{DateTime, Duration, Utc};

use pacekeeper_core_types::RiskLevel;
use pacekeeper_limits_center::HeuristicThresholds;

use crate::windows::{ActivityWindows, LogEntry};

/// Assesses the behavioral risk of admitting one more request.
///
/// High when the rolling hour is already above `hourly_high` or the
/// most recent `burst_count` requests landed inside `burst_window_secs`.
/// Medium when the recent error ratio exceeds `error_ratio_medium`.
pub fn assess(
    entries: &[LogEntry],
    windows: &ActivityWindows,
    thresholds: &HeuristicThresholds,
    now: DateTime<Utc>,
) -> RiskLevel {
    if windows.hour > thresholds.hourly_high {
        return RiskLevel::High;
    }
    if is_burst(entries, thresholds, now) {
        return RiskLevel::High;
    }
    if error_ratio(entries, now) > thresholds.error_ratio_medium {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

/// True when any `burst_count` consecutive requests inside the rolling
/// hour span less than the burst window. Log entries arrive in
/// timestamp order; the burst is flagged wherever it sits in the hour,
/// not only at the tail.
fn is_burst(entries: &[LogEntry], thresholds: &HeuristicThresholds, now: DateTime<Utc>) -> bool {
    let count = thresholds.burst_count as usize;
    if count < 2 {
        return false;
    }
    let floor = now - Duration::seconds(3600);
    let first_recent = entries.partition_point(|entry| entry.ts <= floor);
    let window = Duration::seconds(thresholds.burst_window_secs as i64);
    entries[first_recent..]
        .windows(count)
        .any(|run| run[count - 1].ts - run[0].ts < window)
}

/// Failure fraction over the rolling hour; 0.0 when nothing happened.
pub fn error_ratio(entries: &[LogEntry], now: DateTime<Utc>) -> f64 {
    let floor = now - Duration::seconds(3600);
    let mut total = 0usize;
    let mut failures = 0usize;
    for entry in entries.iter().filter(|entry| entry.ts > floor) {
        total += 1;
        if !entry.success {
            failures += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        failures as f64 / total as f64
    }
}

/// Coefficient of variation of inter-request intervals over the log.
/// `None` when there are too few entries to say anything. Human traffic
/// is irregular; a CoV near zero means metronome timing.
pub fn interval_cov(entries: &[LogEntry]) -> Option<f64> {
    if entries.len() < 5 {
        return None;
    }
    let intervals: Vec<f64> = entries
        .windows(2)
        .map(|pair| (pair[1].ts - pair[0].ts).num_milliseconds() as f64 / 1000.0)
        .collect();
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean <= f64::EPSILON {
        return Some(0.0);
    }
    let variance = intervals
        .iter()
        .map(|interval| (interval - mean).powi(2))
        .sum::<f64>()
        / intervals.len() as f64;
    Some(variance.sqrt() / mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacekeeper_core_types::ActionClass;

    fn thresholds() -> HeuristicThresholds {
        HeuristicThresholds {
            hourly_high: 20,
            burst_count: 5,
            burst_window_secs: 30,
            error_ratio_medium: 0.20,
            regularity_cov: 0.2,
        }
    }

    fn entry_at(ts: DateTime<Utc>, success: bool) -> LogEntry {
        LogEntry {
            ts,
            class: ActionClass::Like,
            endpoint: "/reaction".into(),
            success,
            status_code: if success { 200 } else { 500 },
        }
    }

    fn spaced_entries(count: usize, gap_secs: i64, success: bool) -> Vec<LogEntry> {
        let now = Utc::now();
        (0..count)
            .map(|i| entry_at(now - Duration::seconds(gap_secs * (count - i) as i64), success))
            .collect()
    }

    #[test]
    fn quiet_history_is_low_risk() {
        let entries = spaced_entries(4, 300, true);
        let windows = ActivityWindows::from_entries(&entries, Utc::now());
        assert_eq!(
            assess(&entries, &windows, &thresholds(), Utc::now()),
            RiskLevel::Low
        );
    }

    #[test]
    fn hourly_volume_is_high_risk() {
        // 25 requests inside the hour, spread enough to not be a burst.
        let entries = spaced_entries(25, 120, true);
        let windows = ActivityWindows::from_entries(&entries, Utc::now());
        assert_eq!(
            assess(&entries, &windows, &thresholds(), Utc::now()),
            RiskLevel::High
        );
    }

    #[test]
    fn tight_burst_is_high_risk() {
        let entries = spaced_entries(5, 2, true);
        let windows = ActivityWindows::from_entries(&entries, Utc::now());
        assert!(windows.hour <= thresholds().hourly_high);
        assert_eq!(
            assess(&entries, &windows, &thresholds(), Utc::now()),
            RiskLevel::High
        );
    }

    #[test]
    fn mid_hour_burst_is_high_risk() {
        // A machine-gun run 40 minutes ago followed by well-spaced
        // traffic must still be flagged.
        let now = Utc::now();
        let mut entries: Vec<LogEntry> = (0..5)
            .map(|i| entry_at(now - Duration::minutes(40) + Duration::seconds(2 * i), true))
            .collect();
        entries.push(entry_at(now - Duration::minutes(20), true));
        entries.push(entry_at(now - Duration::minutes(10), true));
        entries.push(entry_at(now - Duration::minutes(5), true));
        let windows = ActivityWindows::from_entries(&entries, now);
        assert!(windows.hour <= thresholds().hourly_high);
        assert_eq!(
            assess(&entries, &windows, &thresholds(), now),
            RiskLevel::High
        );
    }

    #[test]
    fn burst_older_than_an_hour_is_ignored() {
        let now = Utc::now();
        let mut entries: Vec<LogEntry> = (0..5)
            .map(|i| entry_at(now - Duration::minutes(90) + Duration::seconds(2 * i), true))
            .collect();
        entries.push(entry_at(now - Duration::minutes(10), true));
        let windows = ActivityWindows::from_entries(&entries, now);
        assert_eq!(
            assess(&entries, &windows, &thresholds(), now),
            RiskLevel::Low
        );
    }

    #[test]
    fn elevated_error_ratio_is_medium_risk() {
        let now = Utc::now();
        let mut entries = spaced_entries(8, 200, true);
        entries.push(entry_at(now - Duration::seconds(120), false));
        entries.push(entry_at(now - Duration::seconds(60), false));
        entries.push(entry_at(now - Duration::seconds(30), false));
        entries.sort_by_key(|entry| entry.ts);
        let windows = ActivityWindows::from_entries(&entries, now);
        assert_eq!(
            assess(&entries, &windows, &thresholds(), now),
            RiskLevel::Medium
        );
    }

    #[test]
    fn metronome_timing_has_near_zero_cov() {
        let regular = spaced_entries(10, 60, true);
        let cov = interval_cov(&regular).unwrap();
        assert!(cov < 0.05, "cov was {cov}");
        assert!(interval_cov(&regular[..3]).is_none());
    }
}
