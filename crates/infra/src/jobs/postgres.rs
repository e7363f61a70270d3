//! Postgres-backed run ledger (`job_runs` table).
//!
//! ```sql
//! CREATE TABLE job_runs (
//!     id           UUID PRIMARY KEY,
//!     tenant_id    UUID NOT NULL REFERENCES tenants (id),
//!     job_type     TEXT NOT NULL,
//!     status       TEXT NOT NULL CHECK (status IN ('running', 'completed', 'failed')),
//!     details      JSONB NOT NULL DEFAULT 'null',
//!     error        TEXT,
//!     started_at   TIMESTAMPTZ NOT NULL,
//!     completed_at TIMESTAMPTZ
//! );
//! CREATE INDEX job_runs_tenant_started ON job_runs (tenant_id, started_at DESC);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, field, instrument};

use hrflow_core::TenantId;

use super::store::{JobRunFilter, JobRunPage, JobRunStore, Pagination};
use super::types::{JobRun, JobRunId};
use crate::db::{StoreError, map_sqlx_error};

/// Postgres-backed run ledger.
///
/// Finalization is guarded by `status = 'running'`, so a terminal entry is
/// never overwritten even if two writers race.
#[derive(Debug, Clone)]
pub struct PostgresJobRunStore {
    pool: Arc<PgPool>,
}

impl PostgresJobRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl JobRunStore for PostgresJobRunStore {
    #[instrument(
        skip(self, run),
        fields(
            tenant_id = %run.tenant_id,
            job_run_id = %run.id,
            job_type = %run.job_type,
            operation = field::Empty
        ),
        err
    )]
    async fn insert(&self, run: &JobRun) -> Result<(), StoreError> {
        Span::current().record("operation", "insert_job_run");

        sqlx::query(
            r#"
            INSERT INTO job_runs (id, tenant_id, job_type, status, details, error, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(run.id.as_uuid())
        .bind(run.tenant_id.as_uuid())
        .bind(run.job_type.as_str())
        .bind(run.status.as_str())
        .bind(&run.details)
        .bind(run.error.as_deref())
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_job_run", e))?;

        Ok(())
    }

    #[instrument(
        skip(self, run),
        fields(
            tenant_id = %run.tenant_id,
            job_run_id = %run.id,
            status = %run.status,
            operation = field::Empty
        ),
        err
    )]
    async fn finish(&self, run: &JobRun) -> Result<(), StoreError> {
        Span::current().record("operation", "finish_job_run");

        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET status = $3, details = $4, error = $5, completed_at = $6
            WHERE tenant_id = $1 AND id = $2 AND status = 'running'
            "#,
        )
        .bind(run.tenant_id.as_uuid())
        .bind(run.id.as_uuid())
        .bind(run.status.as_str())
        .bind(&run.details)
        .bind(run.error.as_deref())
        .bind(run.completed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("finish_job_run", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidState(format!(
                "job run {} is not running",
                run.id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, job_run_id = %id), err)]
    async fn get(&self, tenant_id: TenantId, id: JobRunId) -> Result<Option<JobRun>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, job_type, status, details, error, started_at, completed_at
            FROM job_runs
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_job_run", e))?;

        row.map(|row| decode(&row)).transpose()
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, limit = pagination.limit, offset = pagination.offset, total = field::Empty),
        err
    )]
    async fn list(
        &self,
        tenant_id: TenantId,
        filter: &JobRunFilter,
        pagination: Pagination,
    ) -> Result<JobRunPage, StoreError> {
        let job_type = filter.job_type.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM job_runs
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR job_type = $2)
              AND ($3::text IS NULL OR status = $3)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(job_type)
        .bind(status)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_job_runs", e))?;

        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, job_type, status, details, error, started_at, completed_at
            FROM job_runs
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR job_type = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY started_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(job_type)
        .bind(status)
        .bind(i64::from(pagination.capped_limit()))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_job_runs", e))?;

        let runs = rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?;
        let total = u64::try_from(total).unwrap_or_default();
        let has_more = u64::from(pagination.offset) + (runs.len() as u64) < total;
        Span::current().record("total", total);

        Ok(JobRunPage {
            runs,
            total,
            pagination,
            has_more,
        })
    }
}

fn decode(row: &sqlx::postgres::PgRow) -> Result<JobRun, StoreError> {
    let row = JobRunRow::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize job run row: {}", e)))?;
    JobRun::try_from(row)
}

// SQLx row types

#[derive(Debug)]
struct JobRunRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    job_type: String,
    status: String,
    details: serde_json::Value,
    error: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for JobRunRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRunRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            job_type: row.try_get("job_type")?,
            status: row.try_get("status")?,
            details: row.try_get("details")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = StoreError;

    fn try_from(row: JobRunRow) -> Result<Self, Self::Error> {
        Ok(JobRun {
            id: JobRunId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            job_type: row
                .job_type
                .parse()
                .map_err(|e| StoreError::Backend(format!("job_runs.job_type: {e}")))?,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Backend(format!("job_runs.status: {e}")))?,
            details: row.details,
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}
