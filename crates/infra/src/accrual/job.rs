use async_trait::async_trait;
use chrono::NaiveDate;

use hrflow_core::{TenantId, TenantScoped};

use super::resolver::{AccrualError, AccrualResolver};
use crate::jobs::{Job, JobOutcome, JobType};

/// `leave_accrual` job: all active leave policies of one tenant.
pub struct AccrualJob {
    resolver: AccrualResolver,
    tenant_id: TenantId,
    as_of: NaiveDate,
}

impl AccrualJob {
    pub fn new(resolver: AccrualResolver, tenant_id: TenantId, as_of: NaiveDate) -> Self {
        Self {
            resolver,
            tenant_id,
            as_of,
        }
    }
}

impl TenantScoped for AccrualJob {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[async_trait]
impl Job for AccrualJob {
    fn job_type(&self) -> JobType {
        JobType::LeaveAccrual
    }

    async fn execute(self: Box<Self>) -> JobOutcome {
        match self.resolver.accrue_tenant(self.tenant_id, self.as_of).await {
            Ok(report) => JobOutcome::completed(&report),
            Err(AccrualError::Incomplete { failed, report }) => {
                JobOutcome::failed(&report, AccrualError::Incomplete { failed, report: report.clone() })
            }
            Err(err) => JobOutcome::failed_bare(err),
        }
    }
}
