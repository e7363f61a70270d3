//! Tenant enumeration for the schedulers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use hrflow_core::TenantId;

use crate::db::{StoreError, map_sqlx_error};

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError>;
}

/// In-memory tenant directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<Vec<TenantId>>,
    unavailable: AtomicBool,
}

impl InMemoryTenantDirectory {
    pub fn new(tenants: impl IntoIterator<Item = TenantId>) -> Self {
        Self {
            tenants: RwLock::new(tenants.into_iter().collect()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn arc(tenants: impl IntoIterator<Item = TenantId>) -> Arc<Self> {
        Arc::new(Self::new(tenants))
    }

    pub fn add(&self, tenant_id: TenantId) {
        if let Ok(mut tenants) = self.tenants.write() {
            if !tenants.contains(&tenant_id) {
                tenants.push(tenant_id);
            }
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("tenant directory offline".to_string()));
        }
        Ok(self.tenants.read()?.clone())
    }
}

/// Postgres-backed tenant directory (`tenants` table).
#[derive(Debug, Clone)]
pub struct PostgresTenantDirectory {
    pool: Arc<PgPool>,
}

impl PostgresTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl TenantDirectory for PostgresTenantDirectory {
    #[instrument(skip(self), err)]
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM tenants ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_tenants", e))?;

        Ok(ids.into_iter().map(TenantId::from_uuid).collect())
    }
}
