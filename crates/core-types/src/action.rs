use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EndpointId, UserId};

/// Resource class of an automated action against the third-party API.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    Connection,
    Like,
    Comment,
    ProfileView,
    Follow,
}

impl ActionClass {
    pub const ALL: [ActionClass; 5] = [
        ActionClass::Connection,
        ActionClass::Like,
        ActionClass::Comment,
        ActionClass::ProfileView,
        ActionClass::Follow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionClass::Connection => "connection",
            ActionClass::Like => "like",
            ActionClass::Comment => "comment",
            ActionClass::ProfileView => "profile_view",
            ActionClass::Follow => "follow",
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority for queued jobs. Highest first in `ALL` so queue
/// polling can iterate in preference order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    pub fn index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

/// Coarse behavioral risk attached to admission decisions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(label)
    }
}

/// Append-only record of one completed attempt against the API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub user: UserId,
    pub class: ActionClass,
    pub endpoint: EndpointId,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub status_code: u16,
    pub latency_ms: u64,
    /// Derived 0-10 score for analytics and heuristics, never for
    /// allow/deny decisions.
    pub risk_score: u8,
}

impl ActionOutcome {
    pub fn new(
        user: UserId,
        class: ActionClass,
        endpoint: EndpointId,
        success: bool,
        status_code: u16,
        latency_ms: u64,
    ) -> Self {
        Self {
            user,
            class,
            endpoint,
            timestamp: Utc::now(),
            success,
            status_code,
            latency_ms,
            risk_score: 0,
        }
    }

    pub fn rate_limited(&self) -> bool {
        self.status_code == 429
    }
}
