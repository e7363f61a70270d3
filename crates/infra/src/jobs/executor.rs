//! Ledgered job execution and the worker loop.
//!
//! Every execution, queued or inline, goes through [`JobExecutor::execute`],
//! which runs these steps on a task of their own:
//!
//! 1. insert a `running` [`JobRun`] (best-effort; a failed insert is logged and
//!    the finalize write is skipped)
//! 2. run the job on its own task so a panic becomes a failed run
//! 3. serialize the details (`{}` on failure, with a warning)
//! 4. finalize as `completed` or `failed` (best-effort)

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job::{BoxedJob, JobError, JobFailure, JobOutcome};
use super::queue::JobReceiver;
use super::store::JobRunStore;
use super::types::JobRun;

/// Runs jobs against the run ledger.
#[derive(Clone)]
pub struct JobExecutor {
    ledger: Arc<dyn JobRunStore>,
}

impl JobExecutor {
    pub fn new(ledger: Arc<dyn JobRunStore>) -> Self {
        Self { ledger }
    }

    /// Execute one job and record it. Returns the details, or the job's error
    /// together with the (partial) details.
    ///
    /// The ledgered sequence runs on its own task: dropping the returned future
    /// does not stop the job or leave its run `running`.
    pub async fn execute(&self, job: BoxedJob) -> Result<Value, JobFailure> {
        let run = JobRun::start(job.tenant_id(), job.job_type());
        let job_run_id = run.id;

        match tokio::spawn(ledgered(Arc::clone(&self.ledger), run, job)).await {
            Ok(result) => result,
            Err(join_err) => Err(JobFailure {
                job_run_id,
                details: Value::Null,
                source: JobError::Aborted(join_err.to_string()),
            }),
        }
    }
}

async fn ledgered(ledger: Arc<dyn JobRunStore>, mut run: JobRun, job: BoxedJob) -> Result<Value, JobFailure> {
    let job_type = run.job_type;
    let tenant_id = run.tenant_id;

    let recorded = match ledger.insert(&run).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                job_run_id = %run.id,
                job_type = %job_type,
                tenant_id = %tenant_id,
                error = %e,
                "failed to record job start; running without ledger entry"
            );
            false
        }
    };

    debug!(job_run_id = %run.id, job_type = %job_type, tenant_id = %tenant_id, "job started");

    let outcome = match tokio::spawn(job.execute()).await {
        Ok(outcome) => outcome,
        Err(join_err) => JobOutcome::failed_bare(JobError::Aborted(join_err.to_string())),
    };
    let (details, error) = outcome.into_parts();

    let details = details.unwrap_or_else(|e| {
        warn!(
            job_run_id = %run.id,
            job_type = %job_type,
            tenant_id = %tenant_id,
            error = %e,
            "failed to serialize job details; recording empty payload"
        );
        Value::Object(Map::new())
    });

    let transition = match &error {
        None => run.complete(details.clone()),
        Some(err) => run.fail(details.clone(), err.to_string()),
    };
    if let Err(e) = transition {
        warn!(job_run_id = %run.id, error = %e, "job run transition rejected");
    }

    if recorded {
        if let Err(e) = ledger.finish(&run).await {
            warn!(
                job_run_id = %run.id,
                job_type = %job_type,
                tenant_id = %tenant_id,
                error = %e,
                "failed to record job completion"
            );
        }
    }

    debug!(
        job_run_id = %run.id,
        job_type = %job_type,
        tenant_id = %tenant_id,
        status = %run.status,
        duration_ms = run.duration().map(|d| d.num_milliseconds()).unwrap_or_default(),
        "job finished"
    );

    match error {
        None => Ok(details),
        Some(source) => Err(JobFailure {
            job_run_id: run.id,
            details,
            source,
        }),
    }
}

/// Consume the queue until cancelled. Jobs still queued at cancellation are
/// abandoned; a job already executing runs to completion.
pub(crate) async fn worker_loop(executor: JobExecutor, mut rx: JobReceiver, cancel: CancellationToken) {
    info!("job worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let job_type = job.job_type();
        let tenant_id = job.tenant_id();
        if let Err(failure) = executor.execute(job).await {
            warn!(
                job_run_id = %failure.job_run_id,
                job_type = %job_type,
                tenant_id = %tenant_id,
                error = %failure.source,
                "job failed"
            );
        }
    }

    info!(abandoned = rx.len(), "job worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::FnJob;
    use crate::jobs::queue::JobQueue;
    use crate::jobs::store::InMemoryJobRunStore;
    use crate::jobs::types::{JobStatus, JobType};
    use hrflow_core::TenantId;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn executor() -> (JobExecutor, Arc<InMemoryJobRunStore>) {
        let ledger = InMemoryJobRunStore::arc();
        (JobExecutor::new(ledger.clone()), ledger)
    }

    #[tokio::test]
    async fn success_is_recorded_as_completed() {
        let (executor, ledger) = executor();
        let tenant = TenantId::new();

        let details = executor
            .execute(Box::new(FnJob::new(JobType::GdprRetention, tenant, || async {
                Ok::<_, anyhow::Error>(json!({"deletedCount": 5}))
            })))
            .await
            .unwrap();
        assert_eq!(details["deletedCount"], 5);

        let runs = ledger.snapshot();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, JobStatus::Completed);
        assert_eq!(runs[0].tenant_id, tenant);
        assert_eq!(runs[0].details, json!({"deletedCount": 5}));
        assert!(runs[0].completed_at.unwrap() >= runs[0].started_at);
    }

    #[tokio::test]
    async fn failure_keeps_partial_details() {
        let (executor, ledger) = executor();
        let failure = executor
            .execute(Box::new(FnJob::new(JobType::GdprRetention, TenantId::new(), || async {
                JobOutcome::failed(&json!({"deletedCount": 1}), anyhow::anyhow!("step 2 failed"))
            })))
            .await
            .unwrap_err();
        assert_eq!(failure.details["deletedCount"], 1);

        let run = &ledger.snapshot()[0];
        assert_eq!(run.id, failure.job_run_id);
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("step 2 failed"));
        assert_eq!(run.details["deletedCount"], 1);
    }

    #[tokio::test]
    async fn unserializable_details_become_empty_object() {
        let (executor, ledger) = executor();
        let details = executor
            .execute(Box::new(FnJob::new(JobType::LeaveAccrual, TenantId::new(), || async {
                let mut bad = HashMap::new();
                bad.insert(vec![1u8], 1);
                JobOutcome::completed(&bad)
            })))
            .await
            .unwrap();
        assert_eq!(details, json!({}));
        assert_eq!(ledger.snapshot()[0].details, json!({}));
        assert_eq!(ledger.snapshot()[0].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn ledger_outage_does_not_stop_execution() {
        let (executor, ledger) = executor();
        ledger.set_unavailable(true);

        let details = executor
            .execute(Box::new(FnJob::new(JobType::LeaveAccrual, TenantId::new(), || async {
                Ok::<_, anyhow::Error>(json!({"ran": true}))
            })))
            .await
            .unwrap();
        assert_eq!(details["ran"], true);

        ledger.set_unavailable(false);
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn panicking_job_is_recorded_as_failed() {
        let (executor, ledger) = executor();
        let failure = executor
            .execute(Box::new(FnJob::new(JobType::LeaveAccrual, TenantId::new(), || async {
                if true {
                    panic!("worker bug");
                }
                Ok::<_, anyhow::Error>(())
            })))
            .await
            .unwrap_err();
        assert!(matches!(failure.source, JobError::Aborted(_)));
        assert_eq!(ledger.snapshot()[0].status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn dropped_caller_still_finalizes_run() {
        let (executor, ledger) = executor();
        let job = FnJob::new(JobType::LeaveAccrual, TenantId::new(), || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, anyhow::Error>(json!({"slow": true}))
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(10), executor.execute(Box::new(job))).await;
        assert!(timed_out.is_err());

        for _ in 0..100 {
            if ledger.snapshot().first().is_some_and(|r| r.status.is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let run = &ledger.snapshot()[0];
        assert_eq!(run.status, JobStatus::Completed);
        assert_eq!(run.details, json!({"slow": true}));
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn worker_drains_in_order_and_survives_failures() {
        let (executor, ledger) = executor();
        let (queue, rx) = JobQueue::bounded(8);
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(worker_loop(executor, rx, cancel.clone()));

        let tenants: Vec<TenantId> = (0..3).map(|_| TenantId::new()).collect();
        queue.enqueue_fn(JobType::GdprRetention, tenants[0], || async {
            Ok::<_, anyhow::Error>(json!(1))
        });
        queue.enqueue_fn(JobType::GdprRetention, tenants[1], || async {
            Err::<Value, _>(anyhow::anyhow!("boom"))
        });
        queue.enqueue_fn(JobType::GdprRetention, tenants[2], || async {
            Ok::<_, anyhow::Error>(json!(3))
        });

        while ledger.snapshot().iter().filter(|r| r.status.is_terminal()).count() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        worker.await.unwrap();

        let runs = ledger.snapshot();
        let order: Vec<TenantId> = runs.iter().map(|r| r.tenant_id).collect();
        assert_eq!(order, tenants);
        assert_eq!(runs[1].status, JobStatus::Failed);
        assert_eq!(runs[2].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn cancelled_worker_does_not_drain_queue() {
        let (executor, ledger) = executor();
        let (queue, rx) = JobQueue::bounded(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        queue.enqueue_fn(JobType::LeaveAccrual, TenantId::new(), || async {
            Ok::<_, anyhow::Error>(())
        });
        worker_loop(executor, rx, cancel).await;

        assert!(ledger.snapshot().is_empty());
    }
}
