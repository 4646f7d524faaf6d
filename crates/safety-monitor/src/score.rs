//! Pure scoring arithmetic. Everything here is a function of its
//! inputs so that two evaluations over the same window agree exactly.

use pacekeeper_admission::windows::LogEntry;
use pacekeeper_core_types::OverallStatus;
use pacekeeper_limits_center::ScoringPolicy;

/// Snapshot of the signals the score is computed from.
#[derive(Clone, Debug, Default)]
pub struct ScoreInputs {
    pub warning_alerts: usize,
    pub critical_alerts: usize,
    pub emergency_alerts: usize,
    /// Failure fraction over the rolling hour.
    pub error_rate: f64,
    /// Actions since local midnight.
    pub daily_count: u32,
    /// Derived compliance score, 0-100.
    pub compliance: u8,
    pub high_risk: bool,
}

/// Score starts at 100 and subtracts per-signal penalties, clamped to
/// [0, 100].
pub fn compute_score(inputs: &ScoreInputs, policy: &ScoringPolicy) -> u8 {
    let mut score: i32 = 100;
    score -= inputs.critical_alerts as i32 * policy.critical_alert_penalty as i32;
    score -= inputs.warning_alerts as i32 * policy.warning_alert_penalty as i32;
    if inputs.emergency_alerts > 0 {
        score -= policy.emergency_alert_penalty as i32;
    }
    if inputs.error_rate > policy.error_rate_threshold {
        score -= policy.error_rate_penalty as i32;
    }
    if inputs.daily_count > policy.daily_action_cap {
        score -= policy.over_budget_penalty as i32;
    }
    if inputs.compliance < policy.compliance_floor {
        score -= policy.compliance_penalty as i32;
    }
    if inputs.high_risk {
        score -= policy.high_risk_penalty as i32;
    }
    score.clamp(0, 100) as u8
}

/// Status from the score with alert-severity overrides: any EMERGENCY
/// alert forces suspension and an unresolved CRITICAL/WARNING alert
/// floors the status even when the numeric score looks fine.
pub fn status_for(score: u8, inputs: &ScoreInputs, policy: &ScoringPolicy) -> OverallStatus {
    if inputs.emergency_alerts > 0 || score < policy.suspend_below {
        OverallStatus::Suspended
    } else if inputs.critical_alerts > 0 || score < policy.critical_below {
        OverallStatus::Critical
    } else if inputs.warning_alerts > 0 || score < policy.warning_below {
        OverallStatus::Warning
    } else {
        OverallStatus::Healthy
    }
}

/// Compliance score over one day of outcomes: each failure costs 2
/// points and each rate-limit response costs 10, from a base of 100.
/// An empty day is fully compliant.
pub fn compliance_score(day_entries: &[&LogEntry]) -> u8 {
    let mut score: i32 = 100;
    for entry in day_entries {
        if entry.status_code == 429 {
            score -= 10;
        } else if !entry.success {
            score -= 2;
        }
    }
    score.clamp(0, 100) as u8
}
