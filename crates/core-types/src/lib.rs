//! Shared primitives for the pacekeeper control plane crates.

pub mod action;
pub mod error;
pub mod ids;
pub mod safety;
pub mod stop;

pub use action::{ActionClass, ActionOutcome, Priority, RiskLevel};
pub use error::PaceError;
pub use ids::{AlertId, EndpointId, JobId, UserId};
pub use safety::{AlertCategory, OverallStatus, SafetyAlert, SafetyStatus, Severity};
pub use stop::{EmergencyStopRecord, StopReason, StopReasonKind};
