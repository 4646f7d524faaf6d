//! Seams to the collaborators that live outside the control plane: the
//! API client that actually performs actions, the token vault, and the
//! message/template resolver.

use std::collections::HashMap;

use async_trait::async_trait;

use pacekeeper_core_types::{ActionClass, PaceError, UserId};

use crate::model::JobPayload;

/// Result of one attempt against the third-party API; the sole input
/// to outcome logging.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub status_code: u16,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok(status_code: u16, latency_ms: u64) -> Self {
        Self {
            success: true,
            status_code,
            latency_ms,
            error: None,
        }
    }

    pub fn failed(status_code: u16, latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            latency_ms,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        user: &UserId,
        class: ActionClass,
        payload: &JobPayload,
        access_token: &str,
    ) -> ExecutionResult;
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// `NotFound` is classified as a permanent failure by the worker.
    async fn access_token(&self, user: &UserId) -> Result<String, PaceError>;
}

#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Resolved message/comment text. `None` degrades to a safe
    /// default instead of blocking the schedule.
    async fn resolve_text(&self, user: &UserId, payload: &JobPayload) -> Option<String>;
}

/// Failure substrings that must never be retried.
const PERMANENT_MARKERS: [&str; 3] = ["permission denied", "account restricted", "already"];

pub fn is_permanent_error(error: &str) -> bool {
    let lowered = error.to_ascii_lowercase();
    PERMANENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Executor that succeeds instantly; handy for tests and dry runs.
pub struct NoopExecutor;

#[async_trait]
impl ActionExecutor for NoopExecutor {
    async fn execute(
        &self,
        _user: &UserId,
        _class: ActionClass,
        _payload: &JobPayload,
        _access_token: &str,
    ) -> ExecutionResult {
        ExecutionResult::ok(200, 0)
    }
}

/// Fixed token map; unknown users get `NotFound`.
#[derive(Default)]
pub struct StaticTokens {
    tokens: HashMap<UserId, String>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, user: UserId, token: impl Into<String>) -> Self {
        self.tokens.insert(user, token.into());
        self
    }
}

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn access_token(&self, user: &UserId) -> Result<String, PaceError> {
        self.tokens
            .get(user)
            .cloned()
            .ok_or_else(|| PaceError::NotFound(format!("no access token for user {user}")))
    }
}

/// Passes through any text already on the payload and otherwise falls
/// back to a neutral default.
pub struct DefaultContent;

#[async_trait]
impl ContentProvider for DefaultContent {
    async fn resolve_text(&self, _user: &UserId, payload: &JobPayload) -> Option<String> {
        match payload {
            JobPayload::Comment { text, .. } => {
                Some(text.clone().unwrap_or_else(|| "Thanks for sharing!".to_string()))
            }
            JobPayload::Connection { note, .. } => note.clone(),
            _ => None,
        }
    }
}
