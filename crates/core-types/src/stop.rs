use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::safety::Severity;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReasonKind {
    Manual,
    RateLimit,
    ApiError,
    ComplianceViolation,
    SuspiciousActivity,
    SystemOverload,
}

impl StopReasonKind {
    pub fn default_severity(self) -> Severity {
        match self {
            StopReasonKind::Manual => Severity::Critical,
            StopReasonKind::RateLimit => Severity::Critical,
            StopReasonKind::ApiError => Severity::Critical,
            StopReasonKind::ComplianceViolation => Severity::Emergency,
            StopReasonKind::SuspiciousActivity => Severity::Critical,
            StopReasonKind::SystemOverload => Severity::Warning,
        }
    }

    /// Default auto-resume delay; `None` means an operator must resume.
    pub fn default_auto_resume_minutes(self) -> Option<u64> {
        match self {
            StopReasonKind::RateLimit => Some(60),
            StopReasonKind::ApiError => Some(30),
            StopReasonKind::SuspiciousActivity => Some(120),
            StopReasonKind::SystemOverload => Some(15),
            StopReasonKind::Manual | StopReasonKind::ComplianceViolation => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StopReasonKind::Manual => "manual",
            StopReasonKind::RateLimit => "rate_limit",
            StopReasonKind::ApiError => "api_error",
            StopReasonKind::ComplianceViolation => "compliance_violation",
            StopReasonKind::SuspiciousActivity => "suspicious_activity",
            StopReasonKind::SystemOverload => "system_overload",
        }
    }
}

impl fmt::Display for StopReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopReason {
    pub kind: StopReasonKind,
    pub severity: Severity,
    pub description: String,
    pub auto_resume_after_minutes: Option<u64>,
}

impl StopReason {
    /// Reason with the kind's default severity and auto-resume delay.
    pub fn categorized(kind: StopReasonKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            description: description.into(),
            auto_resume_after_minutes: kind.default_auto_resume_minutes(),
        }
    }

    pub fn manual(description: impl Into<String>) -> Self {
        Self::categorized(StopReasonKind::Manual, description)
    }

    pub fn manual_resume_required(&self) -> bool {
        self.auto_resume_after_minutes.is_none()
    }
}

/// Authoritative per-user suspension record. Absence of the record
/// means "not suspended".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmergencyStopRecord {
    pub user: UserId,
    pub active: bool,
    pub reason: StopReason,
    pub triggered_at: DateTime<Utc>,
    pub triggered_by: String,
    pub estimated_resume_at: Option<DateTime<Utc>>,
}

impl EmergencyStopRecord {
    pub fn new(user: UserId, reason: StopReason, triggered_by: impl Into<String>) -> Self {
        let triggered_at = Utc::now();
        let estimated_resume_at = reason
            .auto_resume_after_minutes
            .map(|minutes| triggered_at + Duration::minutes(minutes as i64));
        Self {
            user,
            active: true,
            reason,
            triggered_at,
            triggered_by: triggered_by.into(),
            estimated_resume_at,
        }
    }

    pub fn manual_resume_required(&self) -> bool {
        self.reason.manual_resume_required()
    }

    /// True once an auto-resumable record has outlived its estimated
    /// resume time. Manual-resume records never expire on their own.
    pub fn auto_resume_due(&self, now: DateTime<Utc>) -> bool {
        match self.estimated_resume_at {
            Some(at) if !self.manual_resume_required() => now >= at,
            _ => false,
        }
    }
}
