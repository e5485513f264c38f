use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{CachedLinkSnapshot, TenantId};

/// TTL cache of link snapshots, one short-code map per tenant.
///
/// Expiry is checked lazily on read; there is no sweeper and no size bound,
/// so memory is held by every key read within the last TTL. Concurrent fills
/// for the same key are last-write-wins.
pub struct LinkCache {
    entries: DashMap<TenantId, DashMap<String, Arc<CachedLinkSnapshot>>>,
    ttl: Duration,
}

impl LinkCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, tenant_id: &str, short_code: &str) -> Option<Arc<CachedLinkSnapshot>> {
        let codes = self.entries.get(tenant_id)?;
        let snapshot = codes.get(short_code).map(|entry| Arc::clone(entry.value()))?;

        if snapshot.cached_at.elapsed() > self.ttl {
            // Leave a fresher snapshot alone if another request refilled the key meanwhile
            codes.remove_if(short_code, |_, current| Arc::ptr_eq(current, &snapshot));
            return None;
        }

        Some(snapshot)
    }

    pub fn put(
        &self,
        tenant_id: &str,
        short_code: &str,
        snapshot: CachedLinkSnapshot,
    ) -> Arc<CachedLinkSnapshot> {
        let snapshot = Arc::new(snapshot);
        if let Some(codes) = self.entries.get(tenant_id) {
            codes.insert(short_code.to_string(), Arc::clone(&snapshot));
            return snapshot;
        }

        self.entries
            .entry(tenant_id.to_string())
            .or_default()
            .insert(short_code.to_string(), Arc::clone(&snapshot));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|codes| codes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|codes| codes.is_empty())
    }
}
