use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AlertId, UserId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
    Emergency,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Emergency => "emergency",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    RateLimit,
    AccountHealth,
    PatternDetection,
    ApiError,
    ComplianceViolation,
}

impl AlertCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::RateLimit => "rate_limit",
            AlertCategory::AccountHealth => "account_health",
            AlertCategory::PatternDetection => "pattern_detection",
            AlertCategory::ApiError => "api_error",
            AlertCategory::ComplianceViolation => "compliance_violation",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafetyAlert {
    pub id: AlertId,
    pub user: UserId,
    pub severity: Severity,
    pub category: AlertCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub recommended_actions: Vec<String>,
}

impl SafetyAlert {
    pub fn new(
        user: UserId,
        severity: Severity,
        category: AlertCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            user,
            severity,
            category,
            message: message.into(),
            timestamp: Utc::now(),
            resolved: false,
            recommended_actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.recommended_actions = actions;
        self
    }

    /// An alert with the same key is not re-created while an unresolved
    /// instance exists.
    pub fn dedup_key(&self) -> String {
        format!("{}|{}", self.category.as_str(), self.message)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Warning,
    Critical,
    Suspended,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OverallStatus::Healthy => "healthy",
            OverallStatus::Warning => "warning",
            OverallStatus::Critical => "critical",
            OverallStatus::Suspended => "suspended",
        };
        f.write_str(label)
    }
}

/// Recomputed idempotently from the current outcome window; never
/// hand-edited.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafetyStatus {
    pub user: UserId,
    pub score: u8,
    pub status: OverallStatus,
    pub active_alerts: Vec<SafetyAlert>,
    pub last_evaluated_at: DateTime<Utc>,
    pub automation_enabled: bool,
}

impl SafetyStatus {
    pub fn healthy(user: UserId) -> Self {
        Self {
            user,
            score: 100,
            status: OverallStatus::Healthy,
            active_alerts: Vec::new(),
            last_evaluated_at: Utc::now(),
            automation_enabled: true,
        }
    }
}
