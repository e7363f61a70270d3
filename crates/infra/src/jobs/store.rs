//! Run ledger storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hrflow_core::TenantId;

use super::types::{JobRun, JobRunId, JobStatus, JobType};
use crate::db::StoreError;

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 1000;

/// Pagination parameters for ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    /// 0-based.
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }

    /// Limit with the hard cap applied, for callers that built the struct directly.
    pub fn capped_limit(&self) -> u32 {
        self.limit.min(MAX_PAGE_SIZE)
    }
}

/// Optional filters for listing runs; `None` matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunFilter {
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
}

impl JobRunFilter {
    pub fn matches(&self, run: &JobRun) -> bool {
        self.job_type.is_none_or(|t| run.job_type == t) && self.status.is_none_or(|s| run.status == s)
    }
}

/// One page of runs, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunPage {
    pub runs: Vec<JobRun>,
    /// Matching runs across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Run ledger persistence.
///
/// Ledger writes are best-effort from the executor's point of view: callers
/// log failures and carry on.
#[async_trait]
pub trait JobRunStore: Send + Sync {
    /// Record a new `running` entry.
    async fn insert(&self, run: &JobRun) -> Result<(), StoreError>;

    /// Persist the terminal state of a previously inserted `running` entry.
    ///
    /// Fails with `InvalidState` if the stored entry is already terminal.
    async fn finish(&self, run: &JobRun) -> Result<(), StoreError>;

    async fn get(&self, tenant_id: TenantId, id: JobRunId) -> Result<Option<JobRun>, StoreError>;

    async fn list(
        &self,
        tenant_id: TenantId,
        filter: &JobRunFilter,
        pagination: Pagination,
    ) -> Result<JobRunPage, StoreError>;
}

/// In-memory ledger for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobRunStore {
    runs: RwLock<HashMap<JobRunId, JobRun>>,
    unavailable: AtomicBool,
}

impl InMemoryJobRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent call fail with `Unavailable` (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All runs across tenants, oldest first.
    pub fn snapshot(&self) -> Vec<JobRun> {
        let mut runs: Vec<JobRun> = match self.runs.read() {
            Ok(runs) => runs.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        runs.sort_by_key(|r| (r.started_at, r.id.0));
        runs
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("job run store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobRunStore for InMemoryJobRunStore {
    async fn insert(&self, run: &JobRun) -> Result<(), StoreError> {
        self.check_available()?;
        let mut runs = self.runs.write()?;
        if runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!("job run {} already exists", run.id)));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn finish(&self, run: &JobRun) -> Result<(), StoreError> {
        self.check_available()?;
        let mut runs = self.runs.write()?;
        let stored = runs
            .get_mut(&run.id)
            .filter(|stored| stored.tenant_id == run.tenant_id)
            .ok_or(StoreError::NotFound)?;
        if stored.status.is_terminal() {
            return Err(StoreError::InvalidState(format!(
                "job run {} is already {}",
                run.id, stored.status
            )));
        }
        *stored = run.clone();
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: JobRunId) -> Result<Option<JobRun>, StoreError> {
        self.check_available()?;
        let runs = self.runs.read()?;
        Ok(runs.get(&id).filter(|r| r.tenant_id == tenant_id).cloned())
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        filter: &JobRunFilter,
        pagination: Pagination,
    ) -> Result<JobRunPage, StoreError> {
        self.check_available()?;
        let runs = self.runs.read()?;

        let mut matching: Vec<&JobRun> = runs
            .values()
            .filter(|r| r.tenant_id == tenant_id && filter.matches(r))
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.0.cmp(&a.id.0)));

        let total = matching.len();
        let offset = pagination.offset as usize;
        let page: Vec<JobRun> = matching
            .into_iter()
            .skip(offset)
            .take(pagination.capped_limit() as usize)
            .cloned()
            .collect();
        let has_more = offset + page.len() < total;

        Ok(JobRunPage {
            runs: page,
            total: total as u64,
            pagination,
            has_more,
        })
    }
}
