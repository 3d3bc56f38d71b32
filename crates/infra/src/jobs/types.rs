//! Core job types and status policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use genflow_core::{GenerationParams, JobId, OwnerId};

/// Which external workflow a job targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Full content script (scenes/slides/thread/frames/caption).
    ContentScript,
    /// The owner's daily idea batch.
    DailyIdeas,
    /// Generic/custom workflow
    Custom { kind: String },
}

impl JobKind {
    pub fn custom(kind: impl Into<String>) -> Self {
        Self::Custom { kind: kind.into() }
    }

    /// Label carried in the trigger payload.
    pub fn type_name(&self) -> &str {
        match self {
            JobKind::ContentScript => "content_script",
            JobKind::DailyIdeas => "daily_ideas",
            JobKind::Custom { kind } => kind,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Job execution status.
///
/// Moves strictly forward: `pending → running → completed | failed`, and
/// `pending` may jump straight to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Row created, workflow not yet reporting
    Pending,
    /// Workflow picked it up
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    ///
    /// Re-writing the same non-terminal status is allowed (e.g. a progress
    /// update while running); a terminal status never changes.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected backward status move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job status cannot move from {from} to {to}")]
pub struct StatusRegression {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A generation job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Who asked for it
    pub owner: OwnerId,
    pub kind: JobKind,
    pub parameters: GenerationParams,
    pub status: JobStatus,
    /// Raw workflow output, written alongside `completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Workflow error message, written alongside `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(owner: OwnerId, kind: JobKind, parameters: GenerationParams) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner,
            kind,
            parameters,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, rejecting backward moves.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), StatusRegression> {
        if !self.status.can_advance_to(next) {
            return Err(StatusRegression {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark job as running.
    pub fn mark_running(&mut self) -> Result<(), StatusRegression> {
        self.advance(JobStatus::Running)
    }

    /// Mark job as completed with the workflow's raw output.
    pub fn mark_completed(&mut self, result: Value) -> Result<(), StatusRegression> {
        self.advance(JobStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// Mark job as failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), StatusRegression> {
        self.advance(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Body POSTed to the external workflow: `{jobId, kind, ...parameters}`.
    pub fn trigger_payload(&self) -> Value {
        let mut body = Map::new();
        body.insert("jobId".to_string(), Value::String(self.id.to_string()));
        body.insert(
            "kind".to_string(),
            Value::String(self.kind.type_name().to_string()),
        );
        if let Ok(Value::Object(params)) = serde_json::to_value(&self.parameters) {
            for (key, value) in params {
                body.entry(key).or_insert(value);
            }
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> Job {
        Job::new(
            OwnerId::new(),
            JobKind::ContentScript,
            GenerationParams::new("Meal prep", "TikTok"),
        )
    }

    #[test]
    fn job_lifecycle() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Pending);

        job.mark_running().unwrap();
        assert_eq!(job.status, JobStatus::Running);

        job.mark_completed(json!({"hooks": ["h"]})).unwrap();
        assert!(job.is_terminal());
        assert_eq!(job.result, Some(json!({"hooks": ["h"]})));
    }

    #[test]
    fn pending_may_jump_to_terminal() {
        let mut job = job();
        job.mark_failed("workflow crashed").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("workflow crashed"));
    }

    #[test]
    fn status_never_moves_backward() {
        let mut job = job();
        job.mark_running().unwrap();
        assert_eq!(
            job.advance(JobStatus::Pending),
            Err(StatusRegression {
                from: JobStatus::Running,
                to: JobStatus::Pending,
            })
        );

        job.mark_completed(json!({})).unwrap();
        assert!(job.mark_failed("late").is_err());
        assert!(job.mark_running().is_err());
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn trigger_payload_flattens_parameters() {
        let mut job = job();
        job.parameters = job.parameters.clone().with_tone("playful");
        let payload = job.trigger_payload();

        assert_eq!(payload["jobId"], json!(job.id.to_string()));
        assert_eq!(payload["kind"], json!("content_script"));
        assert_eq!(payload["topic"], json!("Meal prep"));
        assert_eq!(payload["platform"], json!("TikTok"));
        assert_eq!(payload["tone"], json!("playful"));
    }

    #[test]
    fn parameters_cannot_shadow_routing_fields() {
        let mut job = job();
        job.parameters = job.parameters.clone().with_extra("jobId", json!("spoofed"));
        assert_eq!(job.trigger_payload()["jobId"], json!(job.id.to_string()));
    }

    #[test]
    fn kinds_serialize_snake_case() {
        assert_eq!(serde_json::to_value(JobKind::DailyIdeas).unwrap(), json!("daily_ideas"));
        assert_eq!(JobKind::custom("carousel").type_name(), "carousel");
        assert_eq!(serde_json::to_value(JobStatus::Completed).unwrap(), json!("completed"));
    }
}
