//! Admission controller: decides, per user and endpoint, whether an
//! automated action may proceed right now.
//!
//! The decision pipeline short-circuits on the first failing check:
//! suspension record, circuit breaker, minute/hour/day windows,
//! behavioral risk heuristic. Denials are structured values with a
//! human-readable reason and a retry estimate, never errors. When the
//! shared store cannot be read the controller fails closed: an
//! uncertain state is never treated as "allowed".

pub mod breaker;
pub mod controller;
pub mod decision;
pub mod heuristic;
pub mod windows;

pub use breaker::{BreakerCheck, BreakerState, CircuitBreaker};
pub use controller::{
    active_stop, classify_endpoint, AdmissionController, AlertSink, NoopAlertSink, OutcomeSink,
};
pub use decision::AdmissionDecision;
pub use windows::{ActivityWindows, LogEntry};
