use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use hrflow_core::{DomainError, DomainResult, LeavePolicyId, TenantId};

/// How often a leave policy credits entitlement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl AccrualFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccrualFrequency::Monthly => "monthly",
            AccrualFrequency::Quarterly => "quarterly",
            AccrualFrequency::Yearly => "yearly",
        }
    }

    fn months(&self) -> u32 {
        match self {
            AccrualFrequency::Monthly => 1,
            AccrualFrequency::Quarterly => 3,
            AccrualFrequency::Yearly => 12,
        }
    }

    /// First day of the accrual period containing `date`.
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        let month0 = match self {
            AccrualFrequency::Monthly => date.month0(),
            AccrualFrequency::Quarterly => date.month0() - date.month0() % 3,
            AccrualFrequency::Yearly => 0,
        };
        NaiveDate::from_ymd_opt(date.year(), month0 + 1, 1).unwrap_or(date)
    }

    /// First day of the period following the one that starts at `period_start`.
    pub fn next_period_start(&self, period_start: NaiveDate) -> Option<NaiveDate> {
        period_start.checked_add_months(Months::new(self.months()))
    }

    /// Period starts that still need crediting as of `as_of`, oldest first.
    ///
    /// Without a watermark only the current period is due (no back-fill before
    /// the first run). With a watermark every period after it, up to and
    /// including the current one, is due. Empty when the watermark already
    /// covers the current period.
    pub fn due_periods(&self, last_accrued_on: Option<NaiveDate>, as_of: NaiveDate) -> Vec<NaiveDate> {
        let current = self.period_start(as_of);
        let Some(last) = last_accrued_on else {
            return vec![current];
        };
        if last >= current {
            return Vec::new();
        }

        let mut due = Vec::new();
        let mut next = self.next_period_start(self.period_start(last));
        while let Some(start) = next {
            if start > current {
                break;
            }
            due.push(start);
            next = self.next_period_start(start);
        }
        due
    }
}

impl core::fmt::Display for AccrualFrequency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AccrualFrequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(AccrualFrequency::Monthly),
            "quarterly" => Ok(AccrualFrequency::Quarterly),
            "yearly" | "annual" => Ok(AccrualFrequency::Yearly),
            other => Err(DomainError::validation(format!("unknown accrual frequency: {other}"))),
        }
    }
}

/// Accrual watermark for one (tenant, leave policy).
///
/// `last_accrued_on` only ever moves forward; it is advanced after the
/// balances for that period have been credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualRun {
    pub tenant_id: TenantId,
    pub policy_id: LeavePolicyId,
    pub last_accrued_on: NaiveDate,
}

impl AccrualRun {
    pub fn new(tenant_id: TenantId, policy_id: LeavePolicyId, last_accrued_on: NaiveDate) -> Self {
        Self {
            tenant_id,
            policy_id,
            last_accrued_on,
        }
    }

    /// Move the watermark to `to`.
    ///
    /// Advancing to the current value is a no-op; moving backwards is rejected.
    pub fn advance(&mut self, to: NaiveDate) -> DomainResult<()> {
        if to < self.last_accrued_on {
            return Err(DomainError::invariant(format!(
                "accrual watermark cannot regress from {} to {}",
                self.last_accrued_on, to
            )));
        }
        self.last_accrued_on = to;
        Ok(())
    }

    /// Whether the period starting at `period_start` has already been credited.
    pub fn covers(&self, period_start: NaiveDate) -> bool {
        self.last_accrued_on >= period_start
    }
}
