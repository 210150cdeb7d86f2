use restock_core::TenantId;

use crate::RestockEvent;

/// Helper trait for tenant-scoped messages and records.
///
/// Infrastructure uses it to restrict work to one tenant (a tenant-scoped scan,
/// for instance) without knowing the concrete type.
pub trait TenantScoped {
    fn tenant_id(&self) -> &TenantId;
}

impl TenantScoped for RestockEvent {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}
