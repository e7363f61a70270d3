//! Bounded, non-blocking work queue.
//!
//! `enqueue` never waits: when the queue is full (or the worker is gone) the
//! job is dropped with a warning and the caller is not told. Schedulers simply
//! re-enqueue on their next tick.

use std::future::Future;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use hrflow_core::TenantId;

use super::job::{BoxedJob, FnJob, Job, JobOutcome};
use super::types::JobType;

pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

pub(crate) type JobReceiver = mpsc::Receiver<BoxedJob>;

/// Producer side of the work queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<BoxedJob>,
    capacity: usize,
}

impl JobQueue {
    /// Create a queue and its single consumer. A capacity of 0 is treated as 1.
    pub fn bounded(capacity: usize) -> (Self, JobReceiver) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently waiting for the worker.
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enqueue<J: Job>(&self, job: J) {
        self.enqueue_boxed(Box::new(job));
    }

    pub fn enqueue_fn<F, Fut, O>(&self, job_type: JobType, tenant_id: TenantId, work: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: Into<JobOutcome> + Send + 'static,
    {
        self.enqueue(FnJob::new(job_type, tenant_id, work));
    }

    pub fn enqueue_boxed(&self, job: BoxedJob) {
        let job_type = job.job_type();
        let tenant_id = job.tenant_id();

        match self.tx.try_send(job) {
            Ok(()) => debug!(job_type = %job_type, tenant_id = %tenant_id, "job enqueued"),
            Err(TrySendError::Full(_)) => warn!(
                job_type = %job_type,
                tenant_id = %tenant_id,
                capacity = self.capacity,
                "job queue full; dropping job"
            ),
            Err(TrySendError::Closed(_)) => warn!(
                job_type = %job_type,
                tenant_id = %tenant_id,
                "job queue closed; dropping job"
            ),
        }
    }
}
