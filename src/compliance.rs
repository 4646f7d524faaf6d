use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pacekeeper_admission::windows::{load_entries, ActivityWindows};
use pacekeeper_admission::heuristic;
use pacekeeper_core_types::{ActionClass, PaceError, RiskLevel, UserId};
use pacekeeper_limits_center::LimitsCenter;

use crate::service::PaceKeeper;

/// Per-class usage against today's ceilings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DailyLimitUsage {
    pub class: ActionClass,
    pub used: u32,
    pub limit: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountHealth {
    pub score: u8,
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecentAction {
    pub timestamp: DateTime<Utc>,
    pub class: ActionClass,
    pub endpoint: String,
    pub success: bool,
}

/// Read-only snapshot for dashboards and analytics consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceMetrics {
    pub user: UserId,
    pub daily_limits: Vec<DailyLimitUsage>,
    pub day_total: u32,
    pub day_cap: u32,
    pub account_health: AccountHealth,
    pub recent_activity: Vec<RecentAction>,
}

const RECENT_ACTIVITY_LIMIT: usize = 20;

impl PaceKeeper {
    pub async fn compliance_metrics(&self, user: &UserId) -> Result<ComplianceMetrics, PaceError> {
        let now = Utc::now();
        let entries = load_entries(self.store().as_ref(), user).await?;
        let windows = ActivityWindows::from_entries(&entries, now);
        let effective = self.limits().for_user(user).await?;
        let snapshot = self.limits().snapshot();

        let daily_limits = ActionClass::ALL
            .into_iter()
            .map(|class| DailyLimitUsage {
                class,
                used: windows.day_count_for(class),
                limit: effective.class_daily.for_class(class),
            })
            .collect();

        let status = self.monitor().status(user).await?;
        let risk_level = heuristic::assess(&entries, &windows, &snapshot.heuristics, now);
        let warnings = status
            .active_alerts
            .iter()
            .filter(|alert| !alert.resolved)
            .map(|alert| alert.message.clone())
            .collect();

        let recent_activity = entries
            .iter()
            .rev()
            .take(RECENT_ACTIVITY_LIMIT)
            .map(|entry| RecentAction {
                timestamp: entry.ts,
                class: entry.class,
                endpoint: entry.endpoint.clone(),
                success: entry.success,
            })
            .collect();

        Ok(ComplianceMetrics {
            user: user.clone(),
            daily_limits,
            day_total: windows.day,
            day_cap: effective.windows.day,
            account_health: AccountHealth {
                score: status.score,
                risk_level,
                warnings,
            },
            recent_activity,
        })
    }
}
