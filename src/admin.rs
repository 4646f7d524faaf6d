use std::sync::Arc;

use tracing::info;

use pacekeeper_admission::AdmissionController;
use pacekeeper_core_types::{EndpointId, PaceError, StopReason, UserId};
use pacekeeper_emergency_stop::StopCoordinator;
use pacekeeper_limits_center::{InMemoryLimitsCenter, LimitsCenter, UserOverride};

/// Privileged operations, kept off the end-user surface. Every call is
/// logged with the acting operator where one is involved.
pub struct AdminOps {
    limits: Arc<InMemoryLimitsCenter>,
    admission: Arc<AdmissionController>,
    coordinator: Arc<StopCoordinator>,
}

impl AdminOps {
    pub(crate) fn new(
        limits: Arc<InMemoryLimitsCenter>,
        admission: Arc<AdmissionController>,
        coordinator: Arc<StopCoordinator>,
    ) -> Self {
        Self {
            limits,
            admission,
            coordinator,
        }
    }

    /// Partially shadows one user's rate ceilings.
    pub async fn set_user_limits(
        &self,
        user: &UserId,
        partial: UserOverride,
    ) -> Result<(), PaceError> {
        self.limits.set_user_limits(user, partial).await?;
        Ok(())
    }

    pub async fn reset_circuit_breaker(&self, endpoint: &EndpointId) -> Result<(), PaceError> {
        self.admission.reset_breaker(endpoint).await
    }

    pub async fn trigger_emergency_stop(
        &self,
        user: &UserId,
        reason: StopReason,
        triggered_by: &str,
    ) -> Result<(), PaceError> {
        info!(target: "pacekeeper", user = %user, triggered_by, "admin emergency stop");
        self.coordinator
            .trigger(user, reason, triggered_by)
            .await
            .map(|_| ())
    }

    pub async fn resume(
        &self,
        user: &UserId,
        requested_by: &str,
        note: &str,
    ) -> Result<(), PaceError> {
        self.coordinator.resume(user, requested_by, note).await
    }

    pub async fn trigger_system_wide_emergency_stop(
        &self,
        reason: StopReason,
        triggered_by: &str,
        affected: Option<Vec<UserId>>,
    ) -> Result<usize, PaceError> {
        self.coordinator
            .trigger_system_wide(reason, triggered_by, affected)
            .await
    }

    pub async fn resume_system_wide(&self, requested_by: &str) -> Result<(), PaceError> {
        self.coordinator.resume_system_wide(requested_by).await
    }
}
