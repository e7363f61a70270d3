//! Integration tests for the job orchestrator against in-memory storage.
//!
//! Tests: scheduler sweep → JobQueue → worker → resolver → run ledger,
//! and `run_now` → resolver → run ledger.
//!
//! Verifies:
//! - Every execution leaves exactly one ledger entry with the right terminal state
//! - Retention and accrual are idempotent end to end
//! - Ledger and serialization failures never stop a job

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
    use serde_json::{Value, json};

    use hrflow_core::TenantId;
    use hrflow_leave::{AccrualFrequency, LeavePolicy};
    use hrflow_retention::{DataCategory, RetentionPolicy};

    use crate::accrual::InMemoryAccrualStore;
    use crate::db::StoreError;
    use crate::jobs::{
        InMemoryJobRunStore, JobError, JobOutcome, JobRunFilter, JobServices, JobStatus, JobType, Orchestrator,
        OrchestratorConfig, OrchestratorError, Pagination,
    };
    use crate::retention::{InMemoryRecordStore, InMemoryRetentionPolicyStore, Record};
    use crate::tenants::InMemoryTenantDirectory;

    struct Fixture {
        orchestrator: Orchestrator,
        ledger: Arc<InMemoryJobRunStore>,
        tenants: Arc<InMemoryTenantDirectory>,
        policies: Arc<InMemoryRetentionPolicyStore>,
        records: Arc<InMemoryRecordStore>,
        accrual: Arc<InMemoryAccrualStore>,
    }

    fn fixture(config: OrchestratorConfig) -> Fixture {
        let ledger = InMemoryJobRunStore::arc();
        let tenants = InMemoryTenantDirectory::arc(Vec::new());
        let policies = InMemoryRetentionPolicyStore::arc();
        let records = InMemoryRecordStore::arc();
        let accrual = InMemoryAccrualStore::arc();
        let services = JobServices {
            ledger: ledger.clone(),
            tenants: tenants.clone(),
            retention_policies: policies.clone(),
            retention_store: records.clone(),
            accrual_store: accrual.clone(),
        };
        Fixture {
            orchestrator: Orchestrator::new(config, services),
            ledger,
            tenants,
            policies,
            records,
            accrual,
        }
    }

    async fn wait_for_terminal_runs(ledger: &InMemoryJobRunStore, expected: usize) {
        for _ in 0..400 {
            if ledger.snapshot().iter().filter(|r| r.status.is_terminal()).count() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {expected} finished runs");
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn full_queue_drops_overflow_before_worker_starts() {
        let f = fixture(OrchestratorConfig {
            queue_capacity: 2,
            ..OrchestratorConfig::manual()
        });
        let tenant = TenantId::new();
        for n in 0..3 {
            f.orchestrator
                .enqueue_fn(JobType::LeaveAccrual, tenant, move || async move { Ok::<_, anyhow::Error>(json!(n)) });
        }
        assert_eq!(f.orchestrator.queue().len(), 2);

        let handle = f.orchestrator.start().unwrap();
        wait_for_terminal_runs(&f.ledger, 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown().await;

        let runs = f.ledger.snapshot();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status == JobStatus::Completed));
        let details: Vec<Value> = runs.iter().map(|r| r.details.clone()).collect();
        assert_eq!(details, vec![json!(0), json!(1)]);
    }

    #[tokio::test]
    async fn retention_sweep_purges_only_records_past_cutoff() {
        let f = fixture(OrchestratorConfig::manual());
        let tenant = TenantId::new();
        f.tenants.add(tenant);
        f.policies.upsert(RetentionPolicy::new(tenant, "audit", 90));

        let now = Utc::now();
        let expired = f
            .records
            .insert("audit_events", Record::new(tenant).at("created_at", now - ChronoDuration::days(91)));
        let retained = f
            .records
            .insert("audit_events", Record::new(tenant).at("created_at", now - ChronoDuration::days(89)));

        assert_eq!(f.orchestrator.enqueue_retention_jobs(now).await, 1);
        let handle = f.orchestrator.start().unwrap();
        wait_for_terminal_runs(&f.ledger, 1).await;
        handle.shutdown().await;

        assert!(!f.records.contains("audit_events", expired));
        assert!(f.records.contains("audit_events", retained));

        let run = &f.ledger.snapshot()[0];
        assert_eq!(run.job_type, JobType::GdprRetention);
        assert_eq!(run.status, JobStatus::Completed);
        assert_eq!(run.details["dataCategory"], "audit");
        assert_eq!(run.details["deletedCount"], 1);
        assert_eq!(run.details["detachedCount"], 0);
    }

    #[tokio::test]
    async fn run_now_error_without_details_is_recorded_as_failed() {
        let f = fixture(OrchestratorConfig::manual());
        let tenant = TenantId::new();

        let failure = f
            .orchestrator
            .run_now_fn(JobType::GdprRetention, tenant, || async {
                Err::<(), _>(anyhow::anyhow!("storage offline"))
            })
            .await
            .unwrap_err();
        assert_eq!(failure.details, Value::Null);
        assert!(matches!(failure.source, JobError::Other(_)));

        let run = f
            .orchestrator
            .get_run(tenant, failure.job_run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.details, Value::Null);
        assert_eq!(run.error.as_deref(), Some("storage offline"));
        assert!(run.completed_at.is_some());

        assert!(
            f.orchestrator
                .get_run(TenantId::new(), failure.job_run_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn repeated_audit_purge_deletes_nothing_new() {
        let f = fixture(OrchestratorConfig::manual());
        let tenant = TenantId::new();
        let now = Utc::now();
        for age in [100, 120, 10] {
            f.records
                .insert("audit_events", Record::new(tenant).at("created_at", now - ChronoDuration::days(age)));
        }
        let cutoff = now - ChronoDuration::days(90);

        let first = f
            .orchestrator
            .run_now(f.orchestrator.retention_job(tenant, DataCategory::Audit, cutoff))
            .await
            .unwrap();
        let second = f
            .orchestrator
            .run_now(f.orchestrator.retention_job(tenant, DataCategory::Audit, cutoff))
            .await
            .unwrap();

        assert_eq!(first["deletedCount"], 2);
        assert_eq!(second["deletedCount"], 0);
        assert_eq!(f.records.count("audit_events", tenant), 1);
        assert_eq!(f.ledger.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn payroll_purge_keeps_open_periods_and_leaves_no_dangling_references() {
        let f = fixture(OrchestratorConfig::manual());
        let tenant = TenantId::new();
        let now = Utc::now();
        let old = now - ChronoDuration::days(3000);

        let finalized = f.records.insert(
            "payroll_periods",
            Record::new(tenant).at("period_end", old).with_text("status", "finalized"),
        );
        let open = f.records.insert(
            "payroll_periods",
            Record::new(tenant).at("period_end", old).with_text("status", "draft"),
        );
        for table in ["payroll_inputs", "payroll_results", "payslips"] {
            f.records
                .insert(table, Record::new(tenant).referencing("period_id", finalized));
        }
        let open_input = f
            .records
            .insert("payroll_inputs", Record::new(tenant).referencing("period_id", open));

        let details = f
            .orchestrator
            .run_now(f.orchestrator.retention_job(
                tenant,
                DataCategory::Payroll,
                now - ChronoDuration::days(2555),
            ))
            .await
            .unwrap();

        assert_eq!(details["deletedCount"], 4);
        assert!(!f.records.contains("payroll_periods", finalized));
        assert!(f.records.contains("payroll_periods", open));
        assert!(f.records.contains("payroll_inputs", open_input));
        assert!(f.records.dangling_references().is_empty());
    }

    #[tokio::test]
    async fn accrual_run_now_twice_credits_once() {
        let f = fixture(OrchestratorConfig::manual());
        let tenant = TenantId::new();
        let policy = LeavePolicy::new(tenant, "Annual", AccrualFrequency::Monthly, 1.5).unwrap();
        f.accrual.add_policy(policy.clone());
        let employee = f.accrual.add_employee(tenant, true);
        let inactive = f.accrual.add_employee(tenant, false);

        let first = f
            .orchestrator
            .run_now(f.orchestrator.accrual_job(tenant, date(2026, 3, 15)))
            .await
            .unwrap();
        let second = f
            .orchestrator
            .run_now(f.orchestrator.accrual_job(tenant, date(2026, 3, 28)))
            .await
            .unwrap();

        assert_eq!(first["policies"][0]["status"], "applied");
        assert_eq!(second["policies"][0]["status"], "up_to_date");
        assert_eq!(f.accrual.balance(employee, policy.id), 1.5);
        assert_eq!(f.accrual.balance(inactive, policy.id), 0.0);

        let runs = f.ledger.snapshot();
        assert_eq!(runs.len(), 2);
        assert!(
            runs.iter()
                .all(|r| r.job_type == JobType::LeaveAccrual && r.status == JobStatus::Completed)
        );
    }

    #[tokio::test]
    async fn ledger_outage_is_not_fatal() {
        let f = fixture(OrchestratorConfig::manual());
        let tenant = TenantId::new();
        f.records.insert(
            "notifications",
            Record::new(tenant).at("created_at", Utc::now() - ChronoDuration::days(400)),
        );
        f.ledger.set_unavailable(true);

        let details = f
            .orchestrator
            .run_now(f.orchestrator.retention_job(
                tenant,
                DataCategory::Notifications,
                Utc::now() - ChronoDuration::days(180),
            ))
            .await
            .unwrap();
        assert_eq!(details["deletedCount"], 1);

        let listed = f
            .orchestrator
            .list_runs(tenant, JobRunFilter::default(), Pagination::default())
            .await;
        assert!(matches!(listed, Err(StoreError::Unavailable(_))));

        f.ledger.set_unavailable(false);
        assert!(f.ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn unserializable_details_are_recorded_as_empty_object() {
        let f = fixture(OrchestratorConfig::manual());
        let details = f
            .orchestrator
            .run_now_fn(JobType::LeaveAccrual, TenantId::new(), || async {
                let mut keyed_by_tuple = HashMap::new();
                keyed_by_tuple.insert((1, 2), "x");
                JobOutcome::completed(&keyed_by_tuple)
            })
            .await
            .unwrap();

        assert_eq!(details, json!({}));
        let run = &f.ledger.snapshot()[0];
        assert_eq!(run.status, JobStatus::Completed);
        assert_eq!(run.details, json!({}));
    }

    #[tokio::test]
    async fn partial_retention_failure_records_partial_counts() {
        let f = fixture(OrchestratorConfig::manual());
        let tenant = TenantId::new();
        let old = Utc::now() - ChronoDuration::days(800);
        let request = f
            .records
            .insert("leave_requests", Record::new(tenant).at("created_at", old));
        f.records.insert(
            "leave_approvals",
            Record::new(tenant)
                .at("created_at", old)
                .referencing("leave_request_id", request),
        );
        f.records.fail_on("leave_requests");

        let failure = f
            .orchestrator
            .run_now(f.orchestrator.retention_job(
                tenant,
                DataCategory::Leave,
                Utc::now() - ChronoDuration::days(365),
            ))
            .await
            .unwrap_err();
        assert!(matches!(failure.source, JobError::Retention(_)));
        assert_eq!(failure.details["deletedCount"], 1);

        let run = &f.ledger.snapshot()[0];
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.details["deletedCount"], 1);
        assert!(run.error.as_deref().is_some_and(|e| e.contains("leave_requests")));
        assert!(f.records.contains("leave_requests", request));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_schedulers() {
        let f = fixture(OrchestratorConfig {
            queue_capacity: 8,
            accrual_interval: Some(Duration::from_secs(60)),
            retention_interval: None,
        });
        let tenant = TenantId::new();
        f.tenants.add(tenant);

        let handle = f.orchestrator.start().unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        while f.ledger.snapshot().iter().filter(|r| r.status.is_terminal()).count() < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.shutdown().await;
        assert!(f.orchestrator.is_shutting_down());

        let after_shutdown = f.ledger.snapshot().len();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(f.ledger.snapshot().len(), after_shutdown);
        assert!(
            f.ledger
                .snapshot()
                .iter()
                .all(|r| r.job_type == JobType::LeaveAccrual && r.tenant_id == tenant)
        );
    }

    #[tokio::test]
    async fn start_is_single_use() {
        let f = fixture(OrchestratorConfig::manual());
        let handle = f.orchestrator.start().unwrap();
        assert!(matches!(f.orchestrator.start(), Err(OrchestratorError::AlreadyStarted)));
        handle.shutdown().await;
    }

    #[test]
    fn start_outside_runtime_fails() {
        let f = fixture(OrchestratorConfig::manual());
        assert!(matches!(f.orchestrator.start(), Err(OrchestratorError::NoRuntime)));
    }

    #[tokio::test]
    async fn list_runs_filters_and_paginates_per_tenant() {
        let f = fixture(OrchestratorConfig::manual());
        let (tenant, other) = (TenantId::new(), TenantId::new());

        f.orchestrator
            .run_now_fn(JobType::LeaveAccrual, tenant, || async { Ok::<_, anyhow::Error>(json!({})) })
            .await
            .unwrap();
        let _ = f
            .orchestrator
            .run_now_fn(JobType::LeaveAccrual, tenant, || async {
                Err::<(), _>(anyhow::anyhow!("boom"))
            })
            .await;
        f.orchestrator
            .run_now_fn(JobType::GdprRetention, tenant, || async { Ok::<_, anyhow::Error>(json!({})) })
            .await
            .unwrap();
        f.orchestrator
            .run_now_fn(JobType::LeaveAccrual, other, || async { Ok::<_, anyhow::Error>(json!({})) })
            .await
            .unwrap();

        let accruals = f
            .orchestrator
            .list_runs(
                tenant,
                JobRunFilter {
                    job_type: Some(JobType::LeaveAccrual),
                    status: None,
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(accruals.total, 2);
        assert!(accruals.runs.iter().all(|r| r.tenant_id == tenant));

        let failed = f
            .orchestrator
            .list_runs(
                tenant,
                JobRunFilter {
                    job_type: Some(JobType::LeaveAccrual),
                    status: Some(JobStatus::Failed),
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(failed.total, 1);
        assert_eq!(failed.runs[0].error.as_deref(), Some("boom"));

        let page = f
            .orchestrator
            .list_runs(tenant, JobRunFilter::default(), Pagination::new(Some(1), None))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.runs.len(), 1);
        assert!(page.has_more);
    }
}
