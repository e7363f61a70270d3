use crate::TenantId;

/// Helper trait for tenant-scoped values.
///
/// Marks types that carry a tenant ID so infrastructure (queues, workers,
/// ledgers) can attribute and filter them without knowing their concrete type.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}
