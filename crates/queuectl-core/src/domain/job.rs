//! Job record and the definition clients enqueue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::state::JobState;
use crate::error::QueueError;

/// Job record: the single source of truth for one unit of work.
///
/// Only the claim protocol (-> Processing), the outcome policy
/// (-> Completed / Failed / Dead) and an explicit DLQ requeue change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,

    /// Number of executions made so far.
    pub attempts: u32,

    /// Ceiling on attempts before the job goes to the DLQ.
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set iff `state == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh job in `Pending` with no attempts.
    pub fn new(
        id: JobId,
        command: impl Into<String>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
        }
    }

    /// Is the job eligible for a claim at `now`?
    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Pending => true,
            JobState::Failed => self.next_retry_at.is_some_and(|at| at <= now),
            _ => false,
        }
    }
}

/// What a client submits to `enqueue`.
///
/// `max_retries` is signed so that a negative value reaches validation
/// instead of failing deserialization with an unhelpful message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i64>,
}

impl JobDefinition {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Parse a JSON job definition, e.g. `{"id":"j1","command":"echo hi"}`.
    pub fn from_json(json: &str) -> Result<Self, QueueError> {
        serde_json::from_str(json)
            .map_err(|e| QueueError::Validation(format!("invalid job definition: {e}")))
    }

    /// Validate and turn the definition into a `Pending` job.
    ///
    /// `default_max_retries` applies when the definition leaves it unset.
    pub fn into_job(self, default_max_retries: u32, now: DateTime<Utc>) -> Result<Job, QueueError> {
        let id = JobId::new(self.id);
        if id.is_blank() {
            return Err(QueueError::Validation("job id is required".into()));
        }
        if self.command.trim().is_empty() {
            return Err(QueueError::Validation("job command is required".into()));
        }
        let max_retries = match self.max_retries {
            None => default_max_retries,
            Some(n) if n < 0 => {
                return Err(QueueError::Validation(format!(
                    "max_retries must be non-negative, got {n}"
                )));
            }
            Some(n) => u32::try_from(n).map_err(|_| {
                QueueError::Validation(format!("max_retries is too large: {n}"))
            })?,
        };

        Ok(Job::new(id, self.command, max_retries, now))
    }
}
