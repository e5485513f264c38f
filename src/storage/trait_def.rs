use crate::models::{ClickEvent, Link, LinkStatus, TenantRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Global lookup of tenants and their verified custom domains.
///
/// The redirect path only reads it; the upsert methods back the admin CLI.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Create directory tables if they do not exist
    async fn init(&self) -> Result<()>;

    /// Find the tenant owning a verified domain. Unverified or unknown hosts yield `None`.
    async fn lookup_by_domain(&self, host: &str) -> Result<Option<TenantRecord>>;

    /// Storage location for a tenant id
    async fn lookup_by_id(&self, tenant_id: &str) -> Result<Option<String>>;

    /// Register a tenant, or update its storage location if the id exists
    async fn upsert_tenant(&self, tenant: &TenantRecord, name: &str) -> Result<()>;

    /// Attach a host to a tenant. Only verified hosts are resolvable.
    async fn upsert_domain(&self, domain: &str, tenant_id: &str, verified: bool) -> Result<()>;
}

/// Per-tenant link and click storage.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Create tenant tables if they do not exist
    async fn init(&self) -> Result<()>;

    async fn get_link_by_short_code(&self, short_code: &str) -> Result<Option<Link>>;

    async fn exists_by_short_code(&self, short_code: &str) -> Result<bool>;

    /// Insert a new link; a taken short code yields `StorageError::Conflict`
    async fn insert_link(&self, link: &Link) -> StorageResult<()>;

    /// Returns false when no link has this short code
    async fn update_link_status(&self, short_code: &str, status: LinkStatus) -> Result<bool>;

    /// Archive active links whose expiry is at or before `now` (unix seconds)
    async fn archive_expired(&self, now: i64) -> Result<u64>;

    async fn insert_click(&self, event: &ClickEvent) -> Result<()>;

    /// Bump the click counter and set the last-click timestamp (unix seconds)
    async fn increment_click_counter(&self, link_id: &str, clicked_at: i64) -> Result<()>;

    /// Release the underlying connections
    async fn close(&self);
}

/// Opens a tenant store from its storage location.
#[async_trait]
pub trait TenantConnector: Send + Sync {
    async fn connect(&self, tenant_id: &str, storage_location: &str)
        -> Result<Arc<dyn TenantStore>>;
}
