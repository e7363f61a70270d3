//! Applies leave accrual for a tenant, one policy at a time.
//!
//! Applications for the same (tenant, policy) are serialized by an async
//! lock; the store's `apply_accrual` re-checks the watermark inside its own
//! transaction, so overlapping sweeps never double-credit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use hrflow_core::{LeavePolicyId, TenantId};
use hrflow_leave::LeavePolicy;

use super::store::{AccrualApplication, AccrualStore};
use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("failed to load leave policies: {0}")]
    Policies(#[source] StoreError),

    /// Some policies failed; `report` lists every policy's outcome.
    #[error("{failed} leave policies failed to accrue")]
    Incomplete { failed: usize, report: AccrualReport },
}

/// Outcome for one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PolicyAccrualStatus {
    Applied {
        periods: Vec<NaiveDate>,
        employees_credited: u64,
    },
    UpToDate,
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAccrual {
    pub policy_id: LeavePolicyId,
    pub policy_name: String,
    #[serde(flatten)]
    pub status: PolicyAccrualStatus,
}

/// Details payload of a `leave_accrual` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualReport {
    pub tenant_id: TenantId,
    pub as_of: NaiveDate,
    pub policies: Vec<PolicyAccrual>,
}

impl AccrualReport {
    pub fn failed(&self) -> usize {
        self.policies
            .iter()
            .filter(|p| matches!(p.status, PolicyAccrualStatus::Failed { .. }))
            .count()
    }
}

type LockMap = HashMap<(TenantId, LeavePolicyId), Arc<tokio::sync::Mutex<()>>>;

#[derive(Clone)]
pub struct AccrualResolver {
    store: Arc<dyn AccrualStore>,
    locks: Arc<Mutex<LockMap>>,
}

impl AccrualResolver {
    pub fn new(store: Arc<dyn AccrualStore>) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_for(&self, tenant_id: TenantId, policy_id: LeavePolicyId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry((tenant_id, policy_id)).or_default())
    }

    /// Credit every due period of every active policy of the tenant as of `as_of`.
    ///
    /// A failing policy does not stop the others; the result is then
    /// [`AccrualError::Incomplete`] carrying the full report.
    pub async fn accrue_tenant(&self, tenant_id: TenantId, as_of: NaiveDate) -> Result<AccrualReport, AccrualError> {
        let policies = self
            .store
            .leave_policies(tenant_id)
            .await
            .map_err(AccrualError::Policies)?;

        let mut report = AccrualReport {
            tenant_id,
            as_of,
            policies: Vec::with_capacity(policies.len()),
        };

        for policy in &policies {
            let status = match self.accrue_policy(policy, as_of).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        tenant_id = %tenant_id,
                        policy_id = %policy.id,
                        error = %e,
                        "leave accrual failed for policy"
                    );
                    PolicyAccrualStatus::Failed { error: e.to_string() }
                }
            };
            report.policies.push(PolicyAccrual {
                policy_id: policy.id,
                policy_name: policy.name.clone(),
                status,
            });
        }

        let failed = report.failed();
        if failed > 0 {
            return Err(AccrualError::Incomplete { failed, report });
        }

        info!(tenant_id = %tenant_id, as_of = %as_of, policies = report.policies.len(), "leave accrual applied");
        Ok(report)
    }

    async fn accrue_policy(&self, policy: &LeavePolicy, as_of: NaiveDate) -> Result<PolicyAccrualStatus, StoreError> {
        let lock = self.lock_for(policy.tenant_id, policy.id);
        let _guard = lock.lock().await;

        let watermark = self
            .store
            .accrual_run(policy.tenant_id, policy.id)
            .await?
            .map(|run| run.last_accrued_on);

        let mut periods = Vec::new();
        let mut employees_credited = 0;
        for period in policy.due_periods(watermark, as_of) {
            match self.store.apply_accrual(policy, period).await? {
                AccrualApplication::Applied {
                    employees_credited: credited,
                } => {
                    periods.push(period);
                    employees_credited += credited;
                }
                AccrualApplication::AlreadyApplied => {
                    debug!(policy_id = %policy.id, period = %period, "accrual period already applied");
                }
            }
        }

        if periods.is_empty() {
            return Ok(PolicyAccrualStatus::UpToDate);
        }
        Ok(PolicyAccrualStatus::Applied {
            periods,
            employees_credited,
        })
    }
}
