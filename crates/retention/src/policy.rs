use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use hrflow_core::TenantId;

use crate::category::DataCategory;

/// How long a tenant keeps one category of data.
///
/// Read-only here; owned by tenant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub tenant_id: TenantId,
    pub category: DataCategory,
    /// Zero or negative disables the policy.
    pub retention_days: i32,
}

impl RetentionPolicy {
    pub fn new(tenant_id: TenantId, category: impl Into<DataCategory>, retention_days: i32) -> Self {
        Self {
            tenant_id,
            category: category.into(),
            retention_days,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.retention_days > 0
    }

    /// Records strictly older than the returned instant age out.
    ///
    /// `None` for disabled policies.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }
        now.checked_sub_signed(Duration::days(i64::from(self.retention_days)))
    }
}
