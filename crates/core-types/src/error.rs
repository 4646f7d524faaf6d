use thiserror::Error;

/// Shared error type for the pacekeeper crates. Policy denials are
/// structured results, not errors; this type covers infrastructure and
/// wiring failures only.
#[derive(Debug, Error, Clone)]
pub enum PaceError {
    #[error("{message}")]
    Message { message: String },
    #[error("store unavailable: {0}")]
    Store(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl PaceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}
