//! Accrual storage: policies, watermarks and the atomic apply.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use hrflow_core::{EmployeeId, LeavePolicyId, TenantId};
use hrflow_leave::{AccrualRun, LeavePolicy};

use crate::db::StoreError;

/// Result of applying one accrual period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualApplication {
    Applied { employees_credited: u64 },
    /// The watermark already covers the period; nothing was credited.
    AlreadyApplied,
}

#[async_trait]
pub trait AccrualStore: Send + Sync {
    /// Active leave policies of the tenant.
    async fn leave_policies(&self, tenant_id: TenantId) -> Result<Vec<LeavePolicy>, StoreError>;

    async fn accrual_run(
        &self,
        tenant_id: TenantId,
        policy_id: LeavePolicyId,
    ) -> Result<Option<AccrualRun>, StoreError>;

    /// Credit `policy.days_per_period` to every active employee of the tenant
    /// for the period starting at `period_start` and advance the watermark,
    /// atomically. Re-checks the watermark first, so a covered period credits
    /// nothing.
    async fn apply_accrual(
        &self,
        policy: &LeavePolicy,
        period_start: NaiveDate,
    ) -> Result<AccrualApplication, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Employee {
    id: EmployeeId,
    tenant_id: TenantId,
    active: bool,
}

#[derive(Debug, Default)]
struct State {
    policies: Vec<LeavePolicy>,
    runs: HashMap<(TenantId, LeavePolicyId), AccrualRun>,
    employees: Vec<Employee>,
    balances: HashMap<(EmployeeId, LeavePolicyId), f64>,
    failing: HashSet<LeavePolicyId>,
}

/// In-memory accrual store for tests/dev. One lock guards all state, so
/// `apply_accrual` is atomic.
#[derive(Debug, Default)]
pub struct InMemoryAccrualStore {
    state: Mutex<State>,
}

impl InMemoryAccrualStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn add_policy(&self, policy: LeavePolicy) {
        if let Ok(mut state) = self.state.lock() {
            state.policies.retain(|p| p.id != policy.id);
            state.policies.push(policy);
        }
    }

    pub fn add_employee(&self, tenant_id: TenantId, active: bool) -> EmployeeId {
        let id = EmployeeId::new();
        if let Ok(mut state) = self.state.lock() {
            state.employees.push(Employee {
                id,
                tenant_id,
                active,
            });
        }
        id
    }

    pub fn set_watermark(&self, run: AccrualRun) {
        if let Ok(mut state) = self.state.lock() {
            state.runs.insert((run.tenant_id, run.policy_id), run);
        }
    }

    /// Accrued days for an employee under a policy; 0 when never credited.
    pub fn balance(&self, employee_id: EmployeeId, policy_id: LeavePolicyId) -> f64 {
        self.state
            .lock()
            .map(|state| state.balances.get(&(employee_id, policy_id)).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Make every `apply_accrual` for `policy_id` fail.
    pub fn fail_policy(&self, policy_id: LeavePolicyId) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(policy_id);
        }
    }
}

#[async_trait]
impl AccrualStore for InMemoryAccrualStore {
    async fn leave_policies(&self, tenant_id: TenantId) -> Result<Vec<LeavePolicy>, StoreError> {
        let state = self.state.lock()?;
        Ok(state
            .policies
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.active)
            .cloned()
            .collect())
    }

    async fn accrual_run(
        &self,
        tenant_id: TenantId,
        policy_id: LeavePolicyId,
    ) -> Result<Option<AccrualRun>, StoreError> {
        let state = self.state.lock()?;
        Ok(state.runs.get(&(tenant_id, policy_id)).cloned())
    }

    async fn apply_accrual(
        &self,
        policy: &LeavePolicy,
        period_start: NaiveDate,
    ) -> Result<AccrualApplication, StoreError> {
        let mut state = self.state.lock()?;
        if state.failing.contains(&policy.id) {
            return Err(StoreError::Backend(format!("accrual for policy {} failed", policy.id)));
        }

        let key = (policy.tenant_id, policy.id);
        if state.runs.get(&key).is_some_and(|run| run.covers(period_start)) {
            return Ok(AccrualApplication::AlreadyApplied);
        }

        let credited: Vec<EmployeeId> = state
            .employees
            .iter()
            .filter(|e| e.tenant_id == policy.tenant_id && e.active)
            .map(|e| e.id)
            .collect();
        for employee in &credited {
            *state.balances.entry((*employee, policy.id)).or_default() += policy.days_per_period;
        }

        match state.runs.entry(key) {
            Entry::Occupied(mut run) => run
                .get_mut()
                .advance(period_start)
                .map_err(|e| StoreError::InvalidState(e.to_string()))?,
            Entry::Vacant(slot) => {
                slot.insert(AccrualRun::new(policy.tenant_id, policy.id, period_start));
            }
        }

        Ok(AccrualApplication::Applied {
            employees_credited: credited.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrflow_leave::AccrualFrequency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn apply_credits_active_employees_once() {
        let store = InMemoryAccrualStore::new();
        let tenant = TenantId::new();
        let policy = LeavePolicy::new(tenant, "Annual leave", AccrualFrequency::Monthly, 1.5).unwrap();
        store.add_policy(policy.clone());
        let active = store.add_employee(tenant, true);
        let inactive = store.add_employee(tenant, false);
        let elsewhere = store.add_employee(TenantId::new(), true);

        let period = date(2026, 3, 1);
        assert_eq!(
            store.apply_accrual(&policy, period).await.unwrap(),
            AccrualApplication::Applied {
                employees_credited: 1
            }
        );
        assert_eq!(
            store.apply_accrual(&policy, period).await.unwrap(),
            AccrualApplication::AlreadyApplied
        );

        assert_eq!(store.balance(active, policy.id), 1.5);
        assert_eq!(store.balance(inactive, policy.id), 0.0);
        assert_eq!(store.balance(elsewhere, policy.id), 0.0);
        let run = store.accrual_run(tenant, policy.id).await.unwrap().unwrap();
        assert_eq!(run.last_accrued_on, period);
    }

    #[tokio::test]
    async fn inactive_policies_are_not_listed() {
        let store = InMemoryAccrualStore::new();
        let tenant = TenantId::new();
        let mut retired = LeavePolicy::new(tenant, "Legacy", AccrualFrequency::Yearly, 20.0).unwrap();
        retired.active = false;
        store.add_policy(retired);
        store.add_policy(LeavePolicy::new(tenant, "Sick", AccrualFrequency::Quarterly, 2.0).unwrap());

        let listed = store.leave_policies(tenant).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Sick");
    }
}
