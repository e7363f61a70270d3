//! Periodic sweeps that enqueue accrual and retention jobs for every tenant.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::JobQueue;
use crate::accrual::{AccrualJob, AccrualResolver};
use crate::retention::{RetentionJob, RetentionPolicyStore, RetentionResolver};
use crate::tenants::TenantDirectory;

/// Call `tick` every `period` until cancelled. The first tick fires one full
/// period after start.
pub(crate) async fn run_every<F, Fut>(name: &'static str, period: Duration, cancel: CancellationToken, mut tick: F)
where
    F: FnMut(DateTime<Utc>) -> Fut,
    Fut: Future<Output = usize>,
{
    info!(scheduler = name, period_secs = period.as_secs(), "scheduler started");

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let scheduled = tick(Utc::now()).await;
                debug!(scheduler = name, scheduled, "scheduler tick");
            }
        }
    }

    info!(scheduler = name, "scheduler stopped");
}

/// Enqueues one `leave_accrual` job per tenant.
pub(crate) struct AccrualSweep {
    pub(crate) tenants: Arc<dyn TenantDirectory>,
    pub(crate) resolver: AccrualResolver,
    pub(crate) queue: JobQueue,
}

impl AccrualSweep {
    /// Returns the number of jobs offered to the queue, including any it dropped.
    pub(crate) async fn run(&self, now: DateTime<Utc>) -> usize {
        let tenants = match self.tenants.list_tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                warn!(error = %e, "accrual sweep: failed to list tenants; skipping tick");
                return 0;
            }
        };

        let as_of = now.date_naive();
        for tenant_id in &tenants {
            self.queue
                .enqueue(AccrualJob::new(self.resolver.clone(), *tenant_id, as_of));
        }
        tenants.len()
    }
}

/// Enqueues one `gdpr_retention` job per enabled (tenant, category) policy.
pub(crate) struct RetentionSweep {
    pub(crate) tenants: Arc<dyn TenantDirectory>,
    pub(crate) policies: Arc<dyn RetentionPolicyStore>,
    pub(crate) resolver: RetentionResolver,
    pub(crate) queue: JobQueue,
}

impl RetentionSweep {
    pub(crate) async fn run(&self, now: DateTime<Utc>) -> usize {
        let tenants = match self.tenants.list_tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                warn!(error = %e, "retention sweep: failed to list tenants; skipping tick");
                return 0;
            }
        };

        let mut scheduled = 0;
        for tenant_id in tenants {
            let policies = match self.policies.policies_for(tenant_id).await {
                Ok(policies) => policies,
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "retention sweep: failed to load policies; skipping tenant");
                    continue;
                }
            };

            for policy in policies {
                let Some(cutoff) = policy.cutoff(now) else {
                    continue;
                };
                self.queue.enqueue(RetentionJob::new(
                    self.resolver.clone(),
                    tenant_id,
                    policy.category,
                    cutoff,
                ));
                scheduled += 1;
            }
        }
        scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accrual::InMemoryAccrualStore;
    use crate::retention::{InMemoryRecordStore, InMemoryRetentionPolicyStore};
    use crate::tenants::InMemoryTenantDirectory;
    use hrflow_core::TenantId;
    use hrflow_retention::RetentionPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_full_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let counter = Arc::clone(&ticks);
        let task = tokio::spawn(run_every("test", Duration::from_secs(60), cancel.clone(), move |_| {
            let counter = Arc::clone(&counter);
            async move { counter.fetch_add(1, Ordering::SeqCst) }
        }));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retention_sweep_enqueues_enabled_policies_only() {
        let (t1, t2, t3) = (TenantId::new(), TenantId::new(), TenantId::new());
        let policies = InMemoryRetentionPolicyStore::arc();
        policies.upsert(RetentionPolicy::new(t1, "audit", 90));
        policies.upsert(RetentionPolicy::new(t1, "leave", 0));
        policies.upsert(RetentionPolicy::new(t2, "payroll", 2555));
        policies.upsert(RetentionPolicy::new(t3, "audit", 30));
        policies.fail_for(t3);

        let (queue, mut rx) = JobQueue::bounded(16);
        let sweep = RetentionSweep {
            tenants: InMemoryTenantDirectory::arc([t1, t2, t3]),
            policies,
            resolver: RetentionResolver::new(InMemoryRecordStore::arc()),
            queue,
        };

        assert_eq!(sweep.run(Utc::now()).await, 2);
        let tenants: Vec<TenantId> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|job| job.tenant_id())
            .collect();
        assert_eq!(tenants, vec![t1, t2]);
    }

    #[tokio::test]
    async fn tenant_listing_failure_skips_tick() {
        let tenants = InMemoryTenantDirectory::arc([TenantId::new()]);
        tenants.set_unavailable(true);
        let (queue, mut rx) = JobQueue::bounded(4);
        let sweep = AccrualSweep {
            tenants,
            resolver: AccrualResolver::new(InMemoryAccrualStore::arc()),
            queue,
        };

        assert_eq!(sweep.run(Utc::now()).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn accrual_sweep_counts_jobs_the_queue_dropped() {
        let (queue, mut rx) = JobQueue::bounded(1);
        let sweep = AccrualSweep {
            tenants: InMemoryTenantDirectory::arc([TenantId::new(), TenantId::new()]),
            resolver: AccrualResolver::new(InMemoryAccrualStore::arc()),
            queue,
        };

        assert_eq!(sweep.run(Utc::now()).await, 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
