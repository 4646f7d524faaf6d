use serde::{Deserialize, Serialize};

use pacekeeper_core_types::RiskLevel;

/// Structured admission result. A denial always carries a
/// human-readable reason and, where one can be estimated, a retry
/// horizon in seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub retry_after_secs: Option<u64>,
    pub risk_level: RiskLevel,
}

impl AdmissionDecision {
    pub fn allow(risk_level: RiskLevel) -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after_secs: None,
            risk_level,
        }
    }

    pub fn deny(
        reason: impl Into<String>,
        retry_after_secs: Option<u64>,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            retry_after_secs,
            risk_level,
        }
    }
}
