pub mod api;
pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;

pub use api::{InMemoryLimitsCenter, LimitsCenter};
pub use defaults::default_snapshot;
pub use errors::LimitsError;
pub use loader::load_snapshot;
pub use model::{
    BreakerPolicy, ClassDailyLimits, EffectiveLimits, HeuristicThresholds, Intervals,
    LimitsSnapshot, PacingRule, PacingRules, RetryPolicy, ScoringPolicy, UserOverride,
    WindowLimits,
};
