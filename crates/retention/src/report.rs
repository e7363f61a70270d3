use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::DataCategory;

/// Rows affected by one retention sweep of one category.
///
/// Serialized as the job run's details payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    pub data_category: DataCategory,
    pub cutoff_date: DateTime<Utc>,
    pub deleted_count: u64,
    /// Rows kept but detached from an expiring parent.
    #[serde(default)]
    pub detached_count: u64,
}

impl RetentionReport {
    pub fn new(data_category: DataCategory, cutoff_date: DateTime<Utc>) -> Self {
        Self {
            data_category,
            cutoff_date,
            deleted_count: 0,
            detached_count: 0,
        }
    }

    pub fn affected(&self) -> u64 {
        self.deleted_count + self.detached_count
    }
}
