//! Safety monitor: recomputes a per-user safety score from the rolling
//! outcome window, raises de-duplicated alerts, and escalates to the
//! emergency-stop coordinator when a user degrades to critical.

pub mod alerts;
pub mod monitor;
pub mod score;

pub use alerts::AlertCenter;
pub use monitor::{spawn_eval_ticker, EmergencyControl, SafetyMonitor};
pub use score::{compliance_score, compute_score, status_for, ScoreInputs};
