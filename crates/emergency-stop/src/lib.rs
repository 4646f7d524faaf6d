//! Emergency stop coordination: the authoritative suspend/resume path
//! for individual users and for the whole deployment.

pub mod coordinator;

pub use coordinator::{spawn_resume_sweep, QueueDrain, StopCoordinator, SWEEP_ACTOR};
