use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use hrflow_core::{DomainError, DomainResult, LeavePolicyId, TenantId};

use crate::accrual::AccrualFrequency;

/// A tenant's leave policy, as far as accrual is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeavePolicy {
    pub id: LeavePolicyId,
    pub tenant_id: TenantId,
    pub name: String,
    pub frequency: AccrualFrequency,
    /// Days credited to each active employee per accrual period.
    pub days_per_period: f64,
    pub active: bool,
}

impl LeavePolicy {
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        frequency: AccrualFrequency,
        days_per_period: f64,
    ) -> DomainResult<Self> {
        if !days_per_period.is_finite() || days_per_period < 0.0 {
            return Err(DomainError::validation(format!(
                "days_per_period must be a non-negative number, got {days_per_period}"
            )));
        }
        Ok(Self {
            id: LeavePolicyId::new(),
            tenant_id,
            name: name.into(),
            frequency,
            days_per_period,
            active: true,
        })
    }

    /// Period starts still to be credited, given the policy's watermark.
    pub fn due_periods(&self, last_accrued_on: Option<NaiveDate>, as_of: NaiveDate) -> Vec<NaiveDate> {
        if !self.active {
            return Vec::new();
        }
        self.frequency.due_periods(last_accrued_on, as_of)
    }
}
