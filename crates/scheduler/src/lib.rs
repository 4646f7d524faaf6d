//! Priority scheduler: per-class job queues processed one at a time
//! with jittered, humanlike pacing, mandatory pre-flight re-validation,
//! and classified retry handling.

pub mod api;
pub mod executor;
pub mod model;
pub mod pacing;
pub mod queue;
pub mod worker;

pub use api::Scheduler;
pub use executor::{
    ActionExecutor, ContentProvider, DefaultContent, ExecutionResult, NoopExecutor,
    StaticTokens, TokenProvider,
};
pub use model::{JobPayload, JobStatus, QueueJob};
pub use pacing::PaceGate;
pub use queue::SchedulerQueues;
pub use worker::{spawn_workers, WorkerContext};
