//! Postgres accrual store.
//!
//! Tables: `leave_policies`, `employees`, `leave_balances`
//! (`PRIMARY KEY (employee_id, policy_id)`) and `accrual_runs`
//! (`PRIMARY KEY (tenant_id, policy_id)`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, field, instrument};

use hrflow_core::{LeavePolicyId, TenantId};
use hrflow_leave::{AccrualRun, LeavePolicy};

use super::store::{AccrualApplication, AccrualStore};
use crate::db::{StoreError, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresAccrualStore {
    pool: Arc<PgPool>,
}

impl PostgresAccrualStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl AccrualStore for PostgresAccrualStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn leave_policies(&self, tenant_id: TenantId) -> Result<Vec<LeavePolicy>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, name, accrual_frequency, days_per_period, active
            FROM leave_policies
            WHERE tenant_id = $1 AND active = TRUE
            ORDER BY name
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("leave_policies", e))?;

        rows.iter()
            .map(|row| {
                LeavePolicyRow::from_row(row)
                    .map_err(|e| StoreError::Backend(format!("failed to deserialize leave policy row: {}", e)))
                    .and_then(LeavePolicy::try_from)
            })
            .collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, policy_id = %policy_id), err)]
    async fn accrual_run(
        &self,
        tenant_id: TenantId,
        policy_id: LeavePolicyId,
    ) -> Result<Option<AccrualRun>, StoreError> {
        let last: Option<NaiveDate> = sqlx::query_scalar(
            "SELECT last_accrued_on FROM accrual_runs WHERE tenant_id = $1 AND policy_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(policy_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("accrual_run", e))?;

        Ok(last.map(|date| AccrualRun::new(tenant_id, policy_id, date)))
    }

    /// One transaction: lock the policy row, re-check the watermark, credit
    /// balances, advance the watermark.
    #[instrument(
        skip(self, policy),
        fields(
            tenant_id = %policy.tenant_id,
            policy_id = %policy.id,
            period_start = %period_start,
            credited = field::Empty
        ),
        err
    )]
    async fn apply_accrual(
        &self,
        policy: &LeavePolicy,
        period_start: NaiveDate,
    ) -> Result<AccrualApplication, StoreError> {
        let tenant = policy.tenant_id.as_uuid();
        let policy_id = policy.id.as_uuid();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_apply_accrual", e))?;

        sqlx::query("SELECT id FROM leave_policies WHERE tenant_id = $1 AND id = $2 FOR UPDATE")
            .bind(tenant)
            .bind(policy_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_leave_policy", e))?
            .ok_or(StoreError::NotFound)?;

        let watermark: Option<NaiveDate> = sqlx::query_scalar(
            "SELECT last_accrued_on FROM accrual_runs WHERE tenant_id = $1 AND policy_id = $2",
        )
        .bind(tenant)
        .bind(policy_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("read_watermark", e))?;

        if watermark.is_some_and(|last| last >= period_start) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback_apply_accrual", e))?;
            return Ok(AccrualApplication::AlreadyApplied);
        }

        let credited = sqlx::query(
            r#"
            INSERT INTO leave_balances (tenant_id, employee_id, policy_id, balance_days, updated_at)
            SELECT e.tenant_id, e.id, $2, $3, NOW()
            FROM employees e
            WHERE e.tenant_id = $1 AND e.status = 'active'
            ON CONFLICT (employee_id, policy_id)
            DO UPDATE SET
                balance_days = leave_balances.balance_days + EXCLUDED.balance_days,
                updated_at = NOW()
            "#,
        )
        .bind(tenant)
        .bind(policy_id)
        .bind(policy.days_per_period)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("credit_balances", e))?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO accrual_runs (tenant_id, policy_id, last_accrued_on, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (tenant_id, policy_id)
            DO UPDATE SET
                last_accrued_on = GREATEST(accrual_runs.last_accrued_on, EXCLUDED.last_accrued_on),
                updated_at = NOW()
            "#,
        )
        .bind(tenant)
        .bind(policy_id)
        .bind(period_start)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("advance_watermark", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_apply_accrual", e))?;

        Span::current().record("credited", credited);
        Ok(AccrualApplication::Applied {
            employees_credited: credited,
        })
    }
}

// SQLx row types

#[derive(Debug)]
struct LeavePolicyRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    accrual_frequency: String,
    days_per_period: f64,
    active: bool,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for LeavePolicyRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(LeavePolicyRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            accrual_frequency: row.try_get("accrual_frequency")?,
            days_per_period: row.try_get("days_per_period")?,
            active: row.try_get("active")?,
        })
    }
}

impl TryFrom<LeavePolicyRow> for LeavePolicy {
    type Error = StoreError;

    fn try_from(row: LeavePolicyRow) -> Result<Self, Self::Error> {
        Ok(LeavePolicy {
            id: LeavePolicyId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            frequency: row
                .accrual_frequency
                .parse()
                .map_err(|e| StoreError::Backend(format!("leave_policies.accrual_frequency: {e}")))?,
            days_per_period: row.days_per_period,
            active: row.active,
        })
    }
}
