//! Runs a category's retention plan for one tenant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use hrflow_core::TenantId;
use hrflow_retention::{DataCategory, RetentionReport, RetentionStep, plan_for};

use super::store::RetentionStore;
use crate::db::StoreError;

/// A retention plan stopped at a failing step.
///
/// `partial` holds the counts of the steps that ran before it.
#[derive(Debug, Error)]
#[error("retention of {category} stopped at step {step} ({table}): {source}")]
pub struct RetentionError {
    pub category: DataCategory,
    pub step: usize,
    pub table: &'static str,
    pub partial: RetentionReport,
    pub source: StoreError,
}

#[derive(Clone)]
pub struct RetentionResolver {
    store: Arc<dyn RetentionStore>,
}

impl RetentionResolver {
    pub fn new(store: Arc<dyn RetentionStore>) -> Self {
        Self { store }
    }

    /// Delete (or detach) the tenant's `category` data older than `cutoff`.
    ///
    /// Steps run in plan order, each as its own statement; the first failure
    /// stops the plan. Unknown categories affect nothing.
    pub async fn purge(
        &self,
        tenant_id: TenantId,
        category: &DataCategory,
        cutoff: DateTime<Utc>,
    ) -> Result<RetentionReport, RetentionError> {
        let mut report = RetentionReport::new(category.clone(), cutoff);
        let plan = plan_for(category);

        if plan.is_empty() {
            debug!(tenant_id = %tenant_id, category = %category, "no retention strategy for category");
            return Ok(report);
        }

        for (idx, step) in plan.iter().enumerate() {
            match self.store.apply_step(tenant_id, step, cutoff).await {
                Ok(rows) => match step {
                    RetentionStep::Purge(_) => report.deleted_count += rows,
                    RetentionStep::Detach { .. } => report.detached_count += rows,
                },
                Err(source) => {
                    warn!(
                        tenant_id = %tenant_id,
                        category = %category,
                        step = idx,
                        table = step.table(),
                        error = %source,
                        "retention step failed"
                    );
                    return Err(RetentionError {
                        category: category.clone(),
                        step: idx,
                        table: step.table(),
                        partial: report,
                        source,
                    });
                }
            }
        }

        info!(
            tenant_id = %tenant_id,
            category = %category,
            cutoff = %cutoff,
            deleted = report.deleted_count,
            detached = report.detached_count,
            "retention applied"
        );
        Ok(report)
    }
}
