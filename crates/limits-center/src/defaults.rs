use crate::model::{
    BreakerPolicy, ClassDailyLimits, HeuristicThresholds, Intervals, LimitsSnapshot, PacingRule,
    PacingRules, RetryPolicy, ScoringPolicy, WindowLimits,
};

pub fn default_snapshot() -> LimitsSnapshot {
    LimitsSnapshot {
        rev: 1,
        windows: WindowLimits {
            minute: 5,
            minute_burst: 10,
            hour: 50,
            day: 500,
        },
        class_daily: ClassDailyLimits {
            connection: 15,
            like: 100,
            comment: 50,
            profile_view: 200,
            follow: 30,
        },
        breaker: BreakerPolicy {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown_secs: 300,
        },
        heuristics: HeuristicThresholds {
            hourly_high: 20,
            burst_count: 5,
            burst_window_secs: 30,
            error_ratio_medium: 0.20,
            regularity_cov: 0.2,
        },
        scoring: ScoringPolicy {
            critical_alert_penalty: 25,
            warning_alert_penalty: 10,
            emergency_alert_penalty: 50,
            error_rate_penalty: 15,
            error_rate_threshold: 0.05,
            over_budget_penalty: 20,
            compliance_penalty: 15,
            compliance_floor: 70,
            compliance_critical: 50,
            high_risk_penalty: 20,
            suspend_below: 30,
            critical_below: 60,
            warning_below: 80,
            error_warning_ratio: 0.03,
            error_critical_ratio: 0.10,
            consecutive_failure_limit: 3,
            daily_action_cap: 500,
        },
        pacing: PacingRules {
            connection: PacingRule {
                min_delay_ms: 60_000,
                max_delay_ms: 180_000,
                max_per_hour: 10,
                max_per_day: 15,
            },
            like: PacingRule {
                min_delay_ms: 15_000,
                max_delay_ms: 60_000,
                max_per_hour: 30,
                max_per_day: 100,
            },
            comment: PacingRule {
                min_delay_ms: 45_000,
                max_delay_ms: 180_000,
                max_per_hour: 15,
                max_per_day: 50,
            },
            profile_view: PacingRule {
                min_delay_ms: 10_000,
                max_delay_ms: 45_000,
                max_per_hour: 40,
                max_per_day: 200,
            },
            follow: PacingRule {
                min_delay_ms: 30_000,
                max_delay_ms: 120_000,
                max_per_hour: 10,
                max_per_day: 30,
            },
            jitter_pct: 0.25,
        },
        retry: RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 60_000,
        },
        intervals: Intervals {
            safety_eval_secs: 60,
            sweep_secs: 30,
            purge_secs: 300,
        },
    }
}
