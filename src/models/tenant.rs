use serde::{Deserialize, Serialize};

/// Tenant identifiers are opaque strings assigned by account provisioning.
pub type TenantId = String;

/// A tenant as seen by the redirect core: who it is and where its data lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    /// Opaque storage descriptor, e.g. `sqlite://./data/tenants/acme.db`
    pub storage_location: String,
}
