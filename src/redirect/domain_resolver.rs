use anyhow::Result;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::models::TenantId;
use crate::storage::TenantDirectory;

/// Maps inbound host names to tenants via the directory's verified domains.
///
/// Only successful lookups are cached, for `ttl` from insertion. Unknown hosts
/// and directory errors are re-queried on the next request.
pub struct DomainResolver {
    directory: Arc<dyn TenantDirectory>,
    cache: Cache<String, TenantId>,
}

impl DomainResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).build();
        Self { directory, cache }
    }

    /// `Ok(None)` means no verified domain matches; `Err` is a directory failure.
    pub async fn resolve(&self, host: &str) -> Result<Option<TenantId>> {
        if let Some(tenant_id) = self.cache.get(host).await {
            return Ok(Some(tenant_id));
        }

        let Some(record) = self.directory.lookup_by_domain(host).await? else {
            return Ok(None);
        };

        self.cache.insert(host.to_string(), record.id.clone()).await;
        Ok(Some(record.id))
    }
}
