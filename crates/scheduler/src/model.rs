use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pacekeeper_core_types::{ActionClass, JobId, Priority, UserId};

/// Typed payload per action class; the discriminant doubles as the
/// queue the job lands in, so a job can never be executed with a
/// payload shape its class does not expect.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum JobPayload {
    Connection {
        target_profile: String,
        note: Option<String>,
    },
    Like {
        target_post: String,
    },
    Comment {
        target_post: String,
        text: Option<String>,
    },
    ProfileView {
        target_profile: String,
    },
    Follow {
        target_profile: String,
    },
}

impl JobPayload {
    pub fn class(&self) -> ActionClass {
        match self {
            JobPayload::Connection { .. } => ActionClass::Connection,
            JobPayload::Like { .. } => ActionClass::Like,
            JobPayload::Comment { .. } => ActionClass::Comment,
            JobPayload::ProfileView { .. } => ActionClass::ProfileView,
            JobPayload::Follow { .. } => ActionClass::Follow,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Legal lifecycle edges. Retries go back through Pending.
    pub fn can_transition(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Pending)
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: JobId,
    pub user: UserId,
    pub class: ActionClass,
    pub priority: Priority,
    pub payload: JobPayload,
    pub scheduled_at: DateTime<Utc>,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn new(
        user: UserId,
        payload: JobPayload,
        priority: Priority,
        scheduled_at: DateTime<Utc>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: JobId::new(),
            user,
            class: payload.class(),
            priority,
            payload,
            scheduled_at,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries,
            error: None,
            created_at: Utc::now(),
        }
    }
}
