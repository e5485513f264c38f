//! Per-tenant storage connections.

pub mod registry;

pub use registry::TenantConnectionRegistry;
