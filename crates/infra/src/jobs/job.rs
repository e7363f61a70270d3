//! The unit of background work carried by the queue.

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use hrflow_core::{TenantId, TenantScoped};

use super::types::{JobRunId, JobType};
use crate::accrual::AccrualError;
use crate::db::StoreError;
use crate::retention::RetentionError;

/// Error raised by a job's work.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Retention(#[from] RetentionError),

    #[error(transparent)]
    Accrual(#[from] AccrualError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The work panicked or its task was cancelled before producing a result.
    #[error("job aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Returned by `run_now` when the work fails; carries whatever details the
/// work produced before failing.
#[derive(Debug, Error)]
#[error("job run {job_run_id} failed: {source}")]
pub struct JobFailure {
    pub job_run_id: JobRunId,
    pub details: Value,
    pub source: JobError,
}

/// What a job produced: a details payload and, on failure, the error.
///
/// Details are serialized eagerly; a serialization error is kept so the
/// executor can record an empty payload instead.
#[derive(Debug)]
pub struct JobOutcome {
    details: Result<Value, serde_json::Error>,
    error: Option<JobError>,
}

impl JobOutcome {
    pub fn completed<T: Serialize + ?Sized>(details: &T) -> Self {
        Self {
            details: serde_json::to_value(details),
            error: None,
        }
    }

    /// Failure with partial details.
    pub fn failed<T: Serialize + ?Sized>(details: &T, error: impl Into<JobError>) -> Self {
        Self {
            details: serde_json::to_value(details),
            error: Some(error.into()),
        }
    }

    /// Failure without any details (`null`).
    pub fn failed_bare(error: impl Into<JobError>) -> Self {
        Self {
            details: Ok(Value::Null),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn into_parts(self) -> (Result<Value, serde_json::Error>, Option<JobError>) {
        (self.details, self.error)
    }
}

impl<T, E> From<Result<T, E>> for JobOutcome
where
    T: Serialize,
    E: Into<JobError>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(details) => JobOutcome::completed(&details),
            Err(err) => JobOutcome::failed_bare(err),
        }
    }
}

/// A queued unit of work: job type, tenant and the work itself.
#[async_trait]
pub trait Job: TenantScoped + Send + 'static {
    fn job_type(&self) -> JobType;

    async fn execute(self: Box<Self>) -> JobOutcome;
}

pub type BoxedJob = Box<dyn Job>;

/// Adapts an async closure into a [`Job`].
///
/// The closure may return a [`JobOutcome`] or any `Result<T: Serialize, E: Into<JobError>>`.
pub struct FnJob<F> {
    job_type: JobType,
    tenant_id: TenantId,
    work: F,
}

impl<F> FnJob<F> {
    pub fn new(job_type: JobType, tenant_id: TenantId, work: F) -> Self {
        Self {
            job_type,
            tenant_id,
            work,
        }
    }
}

impl<F> TenantScoped for FnJob<F> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[async_trait]
impl<F, Fut, O> Job for FnJob<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: Into<JobOutcome> + Send + 'static,
{
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(self: Box<Self>) -> JobOutcome {
        (self.work)().await.into()
    }
}
