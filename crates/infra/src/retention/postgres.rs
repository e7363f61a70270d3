//! Postgres retention adapters.
//!
//! Every [`RetentionStep`] renders to exactly one statement with two binds:
//! `$1` is the tenant id and `$2` the cutoff. Nested scopes become `IN`
//! subqueries, so a step never depends on ids fetched by an earlier one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, field, instrument};

use hrflow_core::TenantId;
use hrflow_retention::{RetentionPolicy, RetentionStep, Scope};

use super::store::{RetentionPolicyStore, RetentionStore};
use crate::db::{StoreError, map_sqlx_error};

/// `WHERE` clause selecting the scope's rows.
fn predicate(scope: &Scope) -> String {
    match scope {
        Scope::Aged {
            age_column, filter, ..
        } => {
            let mut sql = format!("tenant_id = $1 AND {age_column} < $2");
            if let Some(filter) = filter {
                sql.push_str(&format!(" AND {} = '{}'", filter.column, filter.equals));
            }
            sql
        }
        Scope::ChildrenOf {
            foreign_key,
            parent,
            ..
        } => format!("tenant_id = $1 AND {foreign_key} IN ({})", select_ids(parent)),
    }
}

fn select_ids(scope: &Scope) -> String {
    format!("SELECT id FROM {} WHERE {}", scope.table(), predicate(scope))
}

pub(crate) fn render(step: &RetentionStep) -> String {
    match step {
        RetentionStep::Purge(scope) => {
            format!("DELETE FROM {} WHERE {}", scope.table(), predicate(scope))
        }
        RetentionStep::Detach {
            table,
            foreign_key,
            parent,
        } => format!(
            "UPDATE {table} SET {foreign_key} = NULL WHERE tenant_id = $1 AND {foreign_key} IN ({})",
            select_ids(parent)
        ),
    }
}

/// Executes retention steps against Postgres, one autocommitted statement each.
#[derive(Debug, Clone)]
pub struct PostgresRetentionStore {
    pool: Arc<PgPool>,
}

impl PostgresRetentionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl RetentionStore for PostgresRetentionStore {
    #[instrument(
        skip(self, step),
        fields(tenant_id = %tenant_id, table = step.table(), rows = field::Empty),
        err
    )]
    async fn apply_step(
        &self,
        tenant_id: TenantId,
        step: &RetentionStep,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sql = render(step);
        let result = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(cutoff)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(step.table(), e))?;

        Span::current().record("rows", result.rows_affected());
        Ok(result.rows_affected())
    }
}

/// Reads `retention_policies (tenant_id, data_category, retention_days)`.
#[derive(Debug, Clone)]
pub struct PostgresRetentionPolicyStore {
    pool: Arc<PgPool>,
}

impl PostgresRetentionPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl RetentionPolicyStore for PostgresRetentionPolicyStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn policies_for(&self, tenant_id: TenantId) -> Result<Vec<RetentionPolicy>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, data_category, retention_days
            FROM retention_policies
            WHERE tenant_id = $1
            ORDER BY data_category
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("policies_for", e))?;

        rows.iter()
            .map(|row| {
                RetentionPolicyRow::from_row(row)
                    .map(RetentionPolicy::from)
                    .map_err(|e| {
                        StoreError::Backend(format!("failed to deserialize retention policy row: {}", e))
                    })
            })
            .collect()
    }
}

// SQLx row types

#[derive(Debug)]
struct RetentionPolicyRow {
    tenant_id: uuid::Uuid,
    data_category: String,
    retention_days: i32,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for RetentionPolicyRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RetentionPolicyRow {
            tenant_id: row.try_get("tenant_id")?,
            data_category: row.try_get("data_category")?,
            retention_days: row.try_get("retention_days")?,
        })
    }
}

impl From<RetentionPolicyRow> for RetentionPolicy {
    fn from(row: RetentionPolicyRow) -> Self {
        RetentionPolicy::new(TenantId::from_uuid(row.tenant_id), row.data_category, row.retention_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrflow_retention::{DataCategory, plan_for};

    #[test]
    fn audit_renders_a_single_aged_delete() {
        let sql = render(&plan_for(&DataCategory::Audit)[0]);
        assert_eq!(sql, "DELETE FROM audit_events WHERE tenant_id = $1 AND created_at < $2");
    }

    #[test]
    fn payroll_children_select_finalized_periods() {
        let sql = render(&plan_for(&DataCategory::Payroll)[0]);
        assert_eq!(
            sql,
            "DELETE FROM payroll_inputs WHERE tenant_id = $1 AND period_id IN \
             (SELECT id FROM payroll_periods WHERE tenant_id = $1 AND period_end < $2 AND status = 'finalized')"
        );
    }

    #[test]
    fn feedback_detach_renders_an_update() {
        let sql = render(&plan_for(&DataCategory::Performance)[0]);
        assert_eq!(
            sql,
            "UPDATE feedback SET goal_id = NULL WHERE tenant_id = $1 AND goal_id IN \
             (SELECT id FROM goals WHERE tenant_id = $1 AND created_at < $2)"
        );
    }

    #[test]
    fn nested_scopes_render_nested_subqueries() {
        let sql = render(&plan_for(&DataCategory::Performance)[1]);
        assert!(sql.starts_with("DELETE FROM review_responses WHERE tenant_id = $1 AND task_id IN (SELECT id FROM review_tasks"));
        assert!(sql.contains("cycle_id IN (SELECT id FROM review_cycles WHERE tenant_id = $1 AND created_at < $2)"));
    }

    #[test]
    fn gdpr_steps_filter_on_completed_status() {
        let plan = plan_for(&DataCategory::Gdpr);
        assert_eq!(
            render(&plan[0]),
            "DELETE FROM dsar_exports WHERE tenant_id = $1 AND completed_at < $2 AND status = 'completed'"
        );
        assert_eq!(
            render(&plan[1]),
            "DELETE FROM anonymization_jobs WHERE tenant_id = $1 AND completed_at < $2 AND status = 'completed'"
        );
    }
}
