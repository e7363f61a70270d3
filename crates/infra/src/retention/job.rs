use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hrflow_core::{TenantId, TenantScoped};
use hrflow_retention::DataCategory;

use super::resolver::RetentionResolver;
use crate::jobs::{Job, JobOutcome, JobType};

/// `gdpr_retention` job: one category for one tenant.
///
/// Details are the [`RetentionReport`](hrflow_retention::RetentionReport),
/// partial when a step fails.
pub struct RetentionJob {
    resolver: RetentionResolver,
    tenant_id: TenantId,
    category: DataCategory,
    cutoff: DateTime<Utc>,
}

impl RetentionJob {
    pub fn new(
        resolver: RetentionResolver,
        tenant_id: TenantId,
        category: DataCategory,
        cutoff: DateTime<Utc>,
    ) -> Self {
        Self {
            resolver,
            tenant_id,
            category,
            cutoff,
        }
    }
}

impl TenantScoped for RetentionJob {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[async_trait]
impl Job for RetentionJob {
    fn job_type(&self) -> JobType {
        JobType::GdprRetention
    }

    async fn execute(self: Box<Self>) -> JobOutcome {
        match self.resolver.purge(self.tenant_id, &self.category, self.cutoff).await {
            Ok(report) => JobOutcome::completed(&report),
            Err(err) => {
                let partial = err.partial.clone();
                JobOutcome::failed(&partial, err)
            }
        }
    }
}
