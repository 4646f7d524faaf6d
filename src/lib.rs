//! PaceKeeper: an admission and safety control plane for paced,
//! supervised automation against rate-sensitive third-party APIs.
//!
//! The facade wires the member crates into one running service: a
//! shared TTL keyed store, multi-window admission with per-endpoint
//! circuit breakers, per-user safety scoring with alerting, an
//! emergency-stop coordinator, and a priority scheduler with humanlike
//! pacing. See [`PaceKeeper::start`] for the wiring order.

pub mod admin;
pub mod compliance;
pub mod config;
pub mod service;

pub use admin::AdminOps;
pub use compliance::{AccountHealth, ComplianceMetrics, DailyLimitUsage};
pub use config::{ConfigError, PaceKeeperConfig};
pub use service::PaceKeeper;

pub use pacekeeper_admission::{AdmissionController, AdmissionDecision};
pub use pacekeeper_core_types::{
    ActionClass, ActionOutcome, AlertCategory, EmergencyStopRecord, EndpointId, JobId,
    OverallStatus, PaceError, Priority, RiskLevel, SafetyAlert, SafetyStatus, Severity,
    StopReason, StopReasonKind, UserId,
};
pub use pacekeeper_counter_store::{CounterStore, MemoryStore};
pub use pacekeeper_event_bus::{to_mpsc, ControlEvent, EventBus, InMemoryBus, QueueUpdate};
pub use pacekeeper_limits_center::{LimitsCenter, LimitsSnapshot, UserOverride};
pub use pacekeeper_scheduler::{
    ActionExecutor, ContentProvider, DefaultContent, ExecutionResult, JobPayload, JobStatus,
    NoopExecutor, QueueJob, Scheduler, StaticTokens, TokenProvider,
};
