//! Retention storage: policy lookup and per-step statement execution.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use hrflow_core::TenantId;
use hrflow_retention::{RELATIONS, RetentionPolicy, RetentionStep, Scope};

use crate::db::StoreError;

#[async_trait]
pub trait RetentionPolicyStore: Send + Sync {
    async fn policies_for(&self, tenant_id: TenantId) -> Result<Vec<RetentionPolicy>, StoreError>;
}

/// Executes retention steps. Each call is one self-contained statement.
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Apply `step` to the tenant's rows relative to `cutoff`; returns rows affected.
    async fn apply_step(
        &self,
        tenant_id: TenantId,
        step: &RetentionStep,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// In-memory retention policies for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRetentionPolicyStore {
    policies: RwLock<HashMap<TenantId, Vec<RetentionPolicy>>>,
    failing: RwLock<HashSet<TenantId>>,
}

impl InMemoryRetentionPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert or replace the tenant's policy for the same category.
    pub fn upsert(&self, policy: RetentionPolicy) {
        if let Ok(mut policies) = self.policies.write() {
            let tenant = policies.entry(policy.tenant_id).or_default();
            tenant.retain(|p| p.category != policy.category);
            tenant.push(policy);
        }
    }

    /// Make lookups for `tenant_id` fail.
    pub fn fail_for(&self, tenant_id: TenantId) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(tenant_id);
        }
    }
}

#[async_trait]
impl RetentionPolicyStore for InMemoryRetentionPolicyStore {
    async fn policies_for(&self, tenant_id: TenantId) -> Result<Vec<RetentionPolicy>, StoreError> {
        if self.failing.read()?.contains(&tenant_id) {
            return Err(StoreError::Unavailable(format!(
                "retention policies for tenant {tenant_id} unavailable"
            )));
        }
        Ok(self.policies.read()?.get(&tenant_id).cloned().unwrap_or_default())
    }
}

/// A row in the in-memory record store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub timestamps: HashMap<&'static str, DateTime<Utc>>,
    /// Nullable foreign keys.
    pub refs: HashMap<&'static str, Option<Uuid>>,
    pub text: HashMap<&'static str, String>,
}

impl Record {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            timestamps: HashMap::new(),
            refs: HashMap::new(),
            text: HashMap::new(),
        }
    }

    pub fn at(mut self, column: &'static str, value: DateTime<Utc>) -> Self {
        self.timestamps.insert(column, value);
        self
    }

    pub fn referencing(mut self, column: &'static str, parent: Uuid) -> Self {
        self.refs.insert(column, Some(parent));
        self
    }

    pub fn with_text(mut self, column: &'static str, value: impl Into<String>) -> Self {
        self.text.insert(column, value.into());
        self
    }

    fn reference(&self, column: &str) -> Option<Uuid> {
        self.refs.get(column).copied().flatten()
    }
}

type Tables = HashMap<&'static str, Vec<Record>>;

/// In-memory relational store for retention tests/dev.
///
/// Evaluates the same [`RetentionStep`]s as the Postgres adapter and enforces
/// every foreign key in [`RELATIONS`]: purging a parent row that is still
/// referenced fails the whole statement, like Postgres error `23503`.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    failing: RwLock<HashSet<&'static str>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert a row; returns its id.
    pub fn insert(&self, table: &'static str, record: Record) -> Uuid {
        let id = record.id;
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(table).or_default().push(record);
        }
        id
    }

    pub fn get(&self, table: &str, id: Uuid) -> Option<Record> {
        let tables = self.tables.read().ok()?;
        tables.get(table)?.iter().find(|r| r.id == id).cloned()
    }

    pub fn contains(&self, table: &str, id: Uuid) -> bool {
        self.get(table, id).is_some()
    }

    /// Rows of `table` belonging to `tenant_id`.
    pub fn count(&self, table: &str, tenant_id: TenantId) -> usize {
        self.tables
            .read()
            .map(|tables| {
                tables
                    .get(table)
                    .map(|rows| rows.iter().filter(|r| r.tenant_id == tenant_id).count())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Every `(child table, foreign key, child id)` whose parent row is missing.
    pub fn dangling_references(&self) -> Vec<(&'static str, &'static str, Uuid)> {
        let Ok(tables) = self.tables.read() else {
            return Vec::new();
        };
        let mut dangling = Vec::new();
        for relation in RELATIONS {
            let parents: HashSet<Uuid> = tables
                .get(relation.parent)
                .map(|rows| rows.iter().map(|r| r.id).collect())
                .unwrap_or_default();
            for child in tables.get(relation.child).into_iter().flatten() {
                if let Some(parent) = child.reference(relation.foreign_key) {
                    if !parents.contains(&parent) {
                        dangling.push((relation.child, relation.foreign_key, child.id));
                    }
                }
            }
        }
        dangling
    }

    /// Make every statement touching `table` fail.
    pub fn fail_on(&self, table: &'static str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(table);
        }
    }
}

fn resolve(tables: &Tables, tenant_id: TenantId, scope: &Scope, cutoff: DateTime<Utc>) -> HashSet<Uuid> {
    let rows = tables
        .get(scope.table())
        .into_iter()
        .flatten()
        .filter(|r| r.tenant_id == tenant_id);

    match scope {
        Scope::Aged {
            age_column, filter, ..
        } => rows
            .filter(|r| r.timestamps.get(age_column).is_some_and(|ts| *ts < cutoff))
            .filter(|r| {
                filter.is_none_or(|f| r.text.get(f.column).is_some_and(|v| v == f.equals))
            })
            .map(|r| r.id)
            .collect(),
        Scope::ChildrenOf {
            foreign_key,
            parent,
            ..
        } => {
            let parents = resolve(tables, tenant_id, parent, cutoff);
            rows.filter(|r| r.reference(foreign_key).is_some_and(|p| parents.contains(&p)))
                .map(|r| r.id)
                .collect()
        }
    }
}

#[async_trait]
impl RetentionStore for InMemoryRecordStore {
    async fn apply_step(
        &self,
        tenant_id: TenantId,
        step: &RetentionStep,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if self.failing.read()?.contains(step.table()) {
            return Err(StoreError::Backend(format!(
                "statement on {} failed",
                step.table()
            )));
        }

        let mut tables = self.tables.write()?;
        match step {
            RetentionStep::Purge(scope) => {
                let doomed = resolve(&tables, tenant_id, scope, cutoff);
                if doomed.is_empty() {
                    return Ok(0);
                }
                for relation in RELATIONS.iter().filter(|r| r.parent == scope.table()) {
                    let still_referenced = tables
                        .get(relation.child)
                        .into_iter()
                        .flatten()
                        .any(|child| {
                            child
                                .reference(relation.foreign_key)
                                .is_some_and(|p| doomed.contains(&p))
                        });
                    if still_referenced {
                        return Err(StoreError::ForeignKeyViolation(format!(
                            "delete on {} violates {}.{}",
                            relation.parent, relation.child, relation.foreign_key
                        )));
                    }
                }
                let rows = tables.entry(scope.table()).or_default();
                let before = rows.len();
                rows.retain(|r| !doomed.contains(&r.id));
                Ok((before - rows.len()) as u64)
            }
            RetentionStep::Detach {
                table,
                foreign_key,
                parent,
            } => {
                let parents = resolve(&tables, tenant_id, parent, cutoff);
                let mut detached = 0;
                for row in tables.entry(*table).or_default().iter_mut() {
                    if row.tenant_id != tenant_id {
                        continue;
                    }
                    if row.reference(foreign_key).is_some_and(|p| parents.contains(&p)) {
                        row.refs.insert(*foreign_key, None);
                        detached += 1;
                    }
                }
                Ok(detached)
            }
        }
    }
}
