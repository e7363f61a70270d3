//! Explicitly constructed job orchestrator: one queue, one worker, two schedulers.
//!
//! ```text
//!  schedulers ──enqueue──▶ JobQueue (bounded) ──▶ worker ──▶ JobExecutor ──▶ run ledger
//!  callers    ──run_now────────────────────────────────────▶ JobExecutor ──▶ run ledger
//! ```
//!
//! [`Orchestrator::start`] spawns the worker and the enabled schedulers;
//! [`OrchestratorHandle::shutdown`] cancels them all and waits for in-flight
//! work to finish.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hrflow_core::TenantId;
use hrflow_retention::DataCategory;

use super::executor::{JobExecutor, worker_loop};
use super::job::{FnJob, Job, JobFailure, JobOutcome};
use super::postgres::PostgresJobRunStore;
use super::queue::{DEFAULT_QUEUE_CAPACITY, JobQueue, JobReceiver};
use super::scheduler::{AccrualSweep, RetentionSweep, run_every};
use super::store::{JobRunFilter, JobRunPage, JobRunStore, Pagination};
use super::types::{JobRun, JobRunId, JobType};
use crate::accrual::{AccrualJob, AccrualResolver, AccrualStore, PostgresAccrualStore};
use crate::config::JobsConfig;
use crate::db::StoreError;
use crate::retention::{
    PostgresRetentionPolicyStore, PostgresRetentionStore, RetentionJob, RetentionPolicyStore, RetentionResolver,
    RetentionStore,
};
use crate::tenants::{PostgresTenantDirectory, TenantDirectory};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator already started")]
    AlreadyStarted,

    #[error("orchestrator must be started inside a tokio runtime")]
    NoRuntime,
}

/// Orchestrator settings. `None` (or a zero interval) disables a scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub queue_capacity: usize,
    pub accrual_interval: Option<Duration>,
    pub retention_interval: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for OrchestratorConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            accrual_interval: config.accrual_interval(),
            retention_interval: config.retention_interval(),
        }
    }
}

impl OrchestratorConfig {
    /// Queue only; both schedulers disabled.
    pub fn manual() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            accrual_interval: None,
            retention_interval: None,
        }
    }
}

/// Storage collaborators the orchestrator runs against.
#[derive(Clone)]
pub struct JobServices {
    pub ledger: Arc<dyn JobRunStore>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub retention_policies: Arc<dyn RetentionPolicyStore>,
    pub retention_store: Arc<dyn RetentionStore>,
    pub accrual_store: Arc<dyn AccrualStore>,
}

impl JobServices {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            ledger: Arc::new(PostgresJobRunStore::new(pool.clone())),
            tenants: Arc::new(PostgresTenantDirectory::new(pool.clone())),
            retention_policies: Arc::new(PostgresRetentionPolicyStore::new(pool.clone())),
            retention_store: Arc::new(PostgresRetentionStore::new(pool.clone())),
            accrual_store: Arc::new(PostgresAccrualStore::new(pool)),
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    queue: JobQueue,
    receiver: Mutex<Option<JobReceiver>>,
    executor: JobExecutor,
    ledger: Arc<dyn JobRunStore>,
    accrual: AccrualResolver,
    retention: RetentionResolver,
    accrual_sweep: Arc<AccrualSweep>,
    retention_sweep: Arc<RetentionSweep>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, services: JobServices) -> Self {
        let (queue, receiver) = JobQueue::bounded(config.queue_capacity);
        let accrual = AccrualResolver::new(services.accrual_store);
        let retention = RetentionResolver::new(services.retention_store);

        let accrual_sweep = Arc::new(AccrualSweep {
            tenants: Arc::clone(&services.tenants),
            resolver: accrual.clone(),
            queue: queue.clone(),
        });
        let retention_sweep = Arc::new(RetentionSweep {
            tenants: services.tenants,
            policies: services.retention_policies,
            resolver: retention.clone(),
            queue: queue.clone(),
        });

        Self {
            config,
            queue,
            receiver: Mutex::new(Some(receiver)),
            executor: JobExecutor::new(Arc::clone(&services.ledger)),
            ledger: services.ledger,
            accrual,
            retention,
            accrual_sweep,
            retention_sweep,
            cancel: CancellationToken::new(),
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Queue a job for the worker. Never blocks; drops (with a warning) when full.
    pub fn enqueue<J: Job>(&self, job: J) {
        self.queue.enqueue(job);
    }

    pub fn enqueue_fn<F, Fut, O>(&self, job_type: JobType, tenant_id: TenantId, work: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: Into<JobOutcome> + Send + 'static,
    {
        self.queue.enqueue_fn(job_type, tenant_id, work);
    }

    /// Execute a job now, bypassing the queue, and return its outcome.
    ///
    /// The run is ledgered exactly like a queued one.
    pub async fn run_now<J: Job>(&self, job: J) -> Result<Value, JobFailure> {
        self.executor.execute(Box::new(job)).await
    }

    pub async fn run_now_fn<F, Fut, O>(&self, job_type: JobType, tenant_id: TenantId, work: F) -> Result<Value, JobFailure>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: Into<JobOutcome> + Send + 'static,
    {
        self.run_now(FnJob::new(job_type, tenant_id, work)).await
    }

    /// A `leave_accrual` job for one tenant, for `enqueue` or `run_now`.
    pub fn accrual_job(&self, tenant_id: TenantId, as_of: NaiveDate) -> AccrualJob {
        AccrualJob::new(self.accrual.clone(), tenant_id, as_of)
    }

    /// A `gdpr_retention` job for one (tenant, category, cutoff).
    pub fn retention_job(&self, tenant_id: TenantId, category: DataCategory, cutoff: DateTime<Utc>) -> RetentionJob {
        RetentionJob::new(self.retention.clone(), tenant_id, category, cutoff)
    }

    /// Run one accrual scheduler tick now. Returns the number of jobs enqueued.
    pub async fn enqueue_accrual_jobs(&self, now: DateTime<Utc>) -> usize {
        self.accrual_sweep.run(now).await
    }

    /// Run one retention scheduler tick now. Returns the number of jobs enqueued.
    pub async fn enqueue_retention_jobs(&self, now: DateTime<Utc>) -> usize {
        self.retention_sweep.run(now).await
    }

    /// Runs of one tenant, newest first.
    pub async fn list_runs(
        &self,
        tenant_id: TenantId,
        filter: JobRunFilter,
        pagination: Pagination,
    ) -> Result<JobRunPage, StoreError> {
        self.ledger.list(tenant_id, &filter, pagination).await
    }

    pub async fn get_run(&self, tenant_id: TenantId, id: JobRunId) -> Result<Option<JobRun>, StoreError> {
        self.ledger.get(tenant_id, id).await
    }

    /// Spawn the worker and the enabled schedulers. Callable once.
    pub fn start(&self) -> Result<OrchestratorHandle, OrchestratorError> {
        let runtime = Handle::try_current().map_err(|_| OrchestratorError::NoRuntime)?;
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(OrchestratorError::AlreadyStarted)?;

        let mut tasks = vec![runtime.spawn(worker_loop(self.executor.clone(), receiver, self.cancel.clone()))];

        match self.config.accrual_interval.filter(|d| !d.is_zero()) {
            Some(period) => {
                let sweep = Arc::clone(&self.accrual_sweep);
                tasks.push(runtime.spawn(run_every(
                    "leave_accrual",
                    period,
                    self.cancel.clone(),
                    move |now| {
                        let sweep = Arc::clone(&sweep);
                        async move { sweep.run(now).await }
                    },
                )));
            }
            None => info!("accrual scheduler disabled"),
        }

        match self.config.retention_interval.filter(|d| !d.is_zero()) {
            Some(period) => {
                let sweep = Arc::clone(&self.retention_sweep);
                tasks.push(runtime.spawn(run_every(
                    "gdpr_retention",
                    period,
                    self.cancel.clone(),
                    move |now| {
                        let sweep = Arc::clone(&sweep);
                        async move { sweep.run(now).await }
                    },
                )));
            }
            None => info!("retention scheduler disabled"),
        }

        info!(
            queue_capacity = self.queue.capacity(),
            tasks = tasks.len(),
            "job orchestrator started"
        );

        Ok(OrchestratorHandle {
            cancel: self.cancel.clone(),
            tasks,
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Running orchestrator tasks.
#[derive(Debug)]
pub struct OrchestratorHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Signal cancellation and wait for the worker and schedulers to exit.
    /// A job already executing runs to completion; queued jobs are abandoned.
    pub async fn shutdown(self) {
        info!("job orchestrator shutting down");
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "orchestrator task ended abnormally");
            }
        }
        info!("job orchestrator stopped");
    }
}
