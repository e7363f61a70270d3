//! Run ledger types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use hrflow_core::{DomainError, DomainResult, TenantId};

/// Unique job run identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobRunId(pub Uuid);

impl JobRunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of background work, as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    LeaveAccrual,
    GdprRetention,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::LeaveAccrual => "leave_accrual",
            JobType::GdprRetention => "gdpr_retention",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leave_accrual" => Ok(JobType::LeaveAccrual),
            "gdpr_retention" => Ok(JobType::GdprRetention),
            other => Err(DomainError::validation(format!("unknown job type: {other}"))),
        }
    }
}

/// Job run status: `running` until finalized as `completed` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
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

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// One execution attempt of a background job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: JobRunId,
    pub tenant_id: TenantId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Opaque result payload; `null` until finalized.
    pub details: Value,
    /// Error message, set only on `failed`.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRun {
    /// Open a new `running` entry stamped with the current time.
    pub fn start(tenant_id: TenantId, job_type: JobType) -> Self {
        Self {
            id: JobRunId::new(),
            tenant_id,
            job_type,
            status: JobStatus::Running,
            details: Value::Null,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, details: Value) -> DomainResult<()> {
        self.finish(JobStatus::Completed, details, None)
    }

    pub fn fail(&mut self, details: Value, error: impl Into<String>) -> DomainResult<()> {
        self.finish(JobStatus::Failed, details, Some(error.into()))
    }

    fn finish(&mut self, status: JobStatus, details: Value, error: Option<String>) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "job run {} is already {}",
                self.id, self.status
            )));
        }
        self.status = status;
        self.details = details;
        self.error = error;
        self.completed_at = Some(Utc::now().max(self.started_at));
        Ok(())
    }

    /// Wall-clock duration; `None` while running.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }
}
