use pacekeeper_core_types::PaceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LimitsError {
    #[error("invalid limits file: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("store error: {0}")]
    Store(String),
}

impl From<LimitsError> for PaceError {
    fn from(value: LimitsError) -> Self {
        PaceError::new(value.to_string())
    }
}
