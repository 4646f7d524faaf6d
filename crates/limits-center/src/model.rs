use serde::{Deserialize, Serialize};

use pacekeeper_core_types::ActionClass;

/// Full limits policy as seen by a decision. Immutable once read; a new
/// snapshot is swapped in wholesale when an admin changes anything.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LimitsSnapshot {
    pub rev: u64,
    pub windows: WindowLimits,
    pub class_daily: ClassDailyLimits,
    pub breaker: BreakerPolicy,
    pub heuristics: HeuristicThresholds,
    pub scoring: ScoringPolicy,
    pub pacing: PacingRules,
    pub retry: RetryPolicy,
    pub intervals: Intervals,
}

/// Per-window integer ceilings across all action classes.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct WindowLimits {
    pub minute: u32,
    pub minute_burst: u32,
    pub hour: u32,
    pub day: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ClassDailyLimits {
    pub connection: u32,
    pub like: u32,
    pub comment: u32,
    pub profile_view: u32,
    pub follow: u32,
}

impl ClassDailyLimits {
    pub fn for_class(&self, class: ActionClass) -> u32 {
        match class {
            ActionClass::Connection => self.connection,
            ActionClass::Like => self.like,
            ActionClass::Comment => self.comment,
            ActionClass::ProfileView => self.profile_view,
            ActionClass::Follow => self.follow,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown_secs: u64,
}

/// Behavioral-risk thresholds. Hand-tuned policy choices, kept
/// configurable rather than hard-coded at use sites.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct HeuristicThresholds {
    /// Rolling-hour request count above which risk is High.
    pub hourly_high: u32,
    /// Burst rule: this many consecutive requests...
    pub burst_count: u32,
    /// ...spanning less than this window mark a burst.
    pub burst_window_secs: u64,
    /// Error ratio over the recent window above which risk is Medium.
    pub error_ratio_medium: f64,
    /// Coefficient of variation below which inter-request timing is
    /// suspiciously regular.
    pub regularity_cov: f64,
}

/// Safety-score weights and status thresholds.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ScoringPolicy {
    pub critical_alert_penalty: u8,
    pub warning_alert_penalty: u8,
    pub emergency_alert_penalty: u8,
    pub error_rate_penalty: u8,
    pub error_rate_threshold: f64,
    pub over_budget_penalty: u8,
    pub compliance_penalty: u8,
    pub compliance_floor: u8,
    pub compliance_critical: u8,
    pub high_risk_penalty: u8,
    pub suspend_below: u8,
    pub critical_below: u8,
    pub warning_below: u8,
    pub error_warning_ratio: f64,
    pub error_critical_ratio: f64,
    pub consecutive_failure_limit: u32,
    /// System-wide daily action cap used by the over-budget penalty.
    pub daily_action_cap: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PacingRule {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_per_hour: u32,
    pub max_per_day: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PacingRules {
    pub connection: PacingRule,
    pub like: PacingRule,
    pub comment: PacingRule,
    pub profile_view: PacingRule,
    pub follow: PacingRule,
    /// Fractional jitter applied around the drawn delay, e.g. 0.25.
    pub jitter_pct: f64,
}

impl PacingRules {
    pub fn for_class(&self, class: ActionClass) -> &PacingRule {
        match class {
            ActionClass::Connection => &self.connection,
            ActionClass::Like => &self.like,
            ActionClass::Comment => &self.comment,
            ActionClass::ProfileView => &self.profile_view,
            ActionClass::Follow => &self.follow,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Backoff for retry n is `2^n * backoff_base_ms`.
    pub backoff_base_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Intervals {
    pub safety_eval_secs: u64,
    pub sweep_secs: u64,
    pub purge_secs: u64,
}

/// Partial per-user shadowing of the process-wide ceilings. Written
/// only through the admin surface.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct UserOverride {
    pub minute: Option<u32>,
    pub hour: Option<u32>,
    pub day: Option<u32>,
    pub connection: Option<u32>,
    pub like: Option<u32>,
    pub comment: Option<u32>,
    pub profile_view: Option<u32>,
    pub follow: Option<u32>,
}

impl UserOverride {
    pub fn merge(&mut self, other: &UserOverride) {
        macro_rules! shadow {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        shadow!(minute);
        shadow!(hour);
        shadow!(day);
        shadow!(connection);
        shadow!(like);
        shadow!(comment);
        shadow!(profile_view);
        shadow!(follow);
    }
}

/// Process-wide defaults with one user's overrides applied.
#[derive(Clone, Debug)]
pub struct EffectiveLimits {
    pub windows: WindowLimits,
    pub class_daily: ClassDailyLimits,
}

impl EffectiveLimits {
    pub fn resolve(snapshot: &LimitsSnapshot, user_override: Option<&UserOverride>) -> Self {
        let mut windows = snapshot.windows.clone();
        let mut class_daily = snapshot.class_daily.clone();
        if let Some(over) = user_override {
            if let Some(minute) = over.minute {
                windows.minute = minute;
            }
            if let Some(hour) = over.hour {
                windows.hour = hour;
            }
            if let Some(day) = over.day {
                windows.day = day;
            }
            if let Some(v) = over.connection {
                class_daily.connection = v;
            }
            if let Some(v) = over.like {
                class_daily.like = v;
            }
            if let Some(v) = over.comment {
                class_daily.comment = v;
            }
            if let Some(v) = over.profile_view {
                class_daily.profile_view = v;
            }
            if let Some(v) = over.follow {
                class_daily.follow = v;
            }
        }
        Self {
            windows,
            class_daily,
        }
    }
}
