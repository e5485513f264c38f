use anyhow::{bail, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::models::TenantId;
use crate::storage::{TenantConnector, TenantStore};

type Slot = Arc<OnceCell<Arc<dyn TenantStore>>>;

/// Owns exactly one storage handle per tenant for the registry's lifetime.
///
/// Each tenant gets a slot holding a `OnceCell`. Concurrent first accesses for
/// the same tenant share the slot, so only one of them runs the connector and
/// the rest wait on its result. A failed open leaves the cell empty and the
/// next caller retries. Handles are never evicted individually; `shutdown`
/// closes all of them.
pub struct TenantConnectionRegistry {
    connector: Arc<dyn TenantConnector>,
    slots: DashMap<TenantId, Slot>,
    closed: AtomicBool,
}

impl TenantConnectionRegistry {
    pub fn new(connector: Arc<dyn TenantConnector>) -> Self {
        Self {
            connector,
            slots: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Return the tenant's handle, opening it on first use.
    pub async fn get(&self, tenant_id: &str, storage_location: &str) -> Result<Arc<dyn TenantStore>> {
        if self.closed.load(Ordering::Acquire) {
            bail!("tenant connection registry is shut down");
        }

        // Fast path: the guard is released before any await
        if let Some(handle) = self.slots.get(tenant_id).and_then(|slot| slot.get().cloned()) {
            return Ok(handle);
        }

        let slot: Slot = self
            .slots
            .entry(tenant_id.to_string())
            .or_default()
            .value()
            .clone();

        let handle = slot
            .get_or_try_init(|| async {
                info!(tenant_id = %tenant_id, "opening tenant storage");
                self.connector.connect(tenant_id, storage_location).await
            })
            .await?;

        // Shutdown may have cleared the slots while the connector was running
        if self.closed.load(Ordering::Acquire) {
            handle.close().await;
            bail!("tenant connection registry is shut down");
        }

        Ok(Arc::clone(handle))
    }

    /// Number of tenants with an open handle
    pub fn live_handles(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    /// Close every handle. Later `get` calls fail.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);

        let handles: Vec<(TenantId, Arc<dyn TenantStore>)> = self
            .slots
            .iter()
            .filter_map(|slot| slot.value().get().map(|h| (slot.key().clone(), Arc::clone(h))))
            .collect();
        self.slots.clear();

        for (tenant_id, handle) in handles {
            handle.close().await;
            info!(tenant_id = %tenant_id, "closed tenant storage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenantDbConfig;
    use crate::storage::SqliteTenantConnector;

    fn sqlite_registry() -> TenantConnectionRegistry {
        TenantConnectionRegistry::new(Arc::new(SqliteTenantConnector::new(
            TenantDbConfig::default(),
        )))
    }

    #[tokio::test]
    async fn test_get_reuses_handle() {
        let registry = sqlite_registry();
        let first = registry.get("t1", "sqlite::memory:").await.unwrap();
        let second = registry.get("t1", "sqlite::memory:").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.live_handles(), 1);
    }

    #[tokio::test]
    async fn test_tenants_get_separate_handles() {
        let registry = sqlite_registry();
        let a = registry.get("t1", "sqlite::memory:").await.unwrap();
        let b = registry.get("t2", "sqlite::memory:").await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.live_handles(), 2);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_remembered() {
        let registry = sqlite_registry();
        assert!(registry.get("t1", "sqlite:///nonexistent/trackr/t1.db").await.is_err());
        assert_eq!(registry.live_handles(), 0);

        registry.get("t1", "sqlite::memory:").await.unwrap();
        assert_eq!(registry.live_handles(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_rejects() {
        let registry = sqlite_registry();
        registry.get("t1", "sqlite::memory:").await.unwrap();

        registry.shutdown().await;

        assert_eq!(registry.live_handles(), 0);
        assert!(registry.get("t1", "sqlite::memory:").await.is_err());
    }
}
