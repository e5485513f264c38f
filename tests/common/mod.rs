//! In-memory fakes shared by the integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::http::Request;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::Layer;

use trackr::models::{ClickEvent, Link, LinkStatus, RedirectKind, RoutingRules, TenantRecord};
use trackr::storage::{StorageError, StorageResult, TenantConnector, TenantDirectory, TenantStore};

pub fn link(short_code: &str, destination: &str) -> Link {
    Link {
        id: format!("link-{short_code}"),
        short_code: short_code.to_string(),
        destination_url: destination.to_string(),
        title: None,
        redirect_kind: RedirectKind::Temporary,
        rules: None,
        status: LinkStatus::Active,
        expires_at: None,
        click_count: 0,
        last_click_at: None,
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
    }
}

pub fn link_with_rules(short_code: &str, destination: &str, rules: RoutingRules) -> Link {
    Link {
        rules: Some(rules),
        ..link(short_code, destination)
    }
}

/// Tenant store that keeps everything in memory and counts reads.
#[derive(Default)]
pub struct MemoryStore {
    links: Mutex<HashMap<String, Link>>,
    clicks: Mutex<Vec<ClickEvent>>,
    pub link_reads: AtomicUsize,
    pub fail_link_reads: AtomicBool,
    /// Delay applied before every click insert
    click_delay: Mutex<Option<Duration>>,
    pub fail_click_inserts: AtomicBool,
    pub panic_on_click: AtomicBool,
    pub closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_links(links: impl IntoIterator<Item = Link>) -> Self {
        let store = Self::new();
        for link in links {
            store.put_link(link);
        }
        store
    }

    pub fn put_link(&self, link: Link) {
        self.links
            .lock()
            .unwrap()
            .insert(link.short_code.clone(), link);
    }

    pub fn set_click_delay(&self, delay: Duration) {
        *self.click_delay.lock().unwrap() = Some(delay);
    }

    pub fn clicks(&self) -> Vec<ClickEvent> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn stored_link(&self, short_code: &str) -> Option<Link> {
        self.links.lock().unwrap().get(short_code).cloned()
    }

    pub fn reads(&self) -> usize {
        self.link_reads.load(Ordering::SeqCst)
    }

    /// Poll until `n` clicks are stored or the timeout passes
    pub async fn wait_for_clicks(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.clicks.lock().unwrap().len() < n {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get_link_by_short_code(&self, short_code: &str) -> Result<Option<Link>> {
        self.link_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_link_reads.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        Ok(self.stored_link(short_code))
    }

    async fn exists_by_short_code(&self, short_code: &str) -> Result<bool> {
        Ok(self.links.lock().unwrap().contains_key(short_code))
    }

    async fn insert_link(&self, link: &Link) -> StorageResult<()> {
        let mut links = self.links.lock().unwrap();
        if links.contains_key(&link.short_code) {
            return Err(StorageError::Conflict);
        }
        links.insert(link.short_code.clone(), link.clone());
        Ok(())
    }

    async fn update_link_status(&self, short_code: &str, status: LinkStatus) -> Result<bool> {
        Ok(match self.links.lock().unwrap().get_mut(short_code) {
            Some(link) => {
                link.status = status;
                true
            }
            None => false,
        })
    }

    async fn archive_expired(&self, now: i64) -> Result<u64> {
        let mut archived = 0;
        for link in self.links.lock().unwrap().values_mut() {
            if link.status == LinkStatus::Active && link.expires_at.is_some_and(|at| at <= now) {
                link.status = LinkStatus::Archived;
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn insert_click(&self, event: &ClickEvent) -> Result<()> {
        let delay = *self.click_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_click.load(Ordering::SeqCst) {
            panic!("click store exploded");
        }
        if self.fail_click_inserts.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.clicks.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn increment_click_counter(&self, link_id: &str, clicked_at: i64) -> Result<()> {
        for link in self.links.lock().unwrap().values_mut() {
            if link.id == link_id {
                link.click_count += 1;
                link.last_click_at = Some(clicked_at);
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out pre-built stores by tenant id and counts how often it is asked to connect.
#[derive(Default)]
pub struct CountingConnector {
    stores: HashMap<String, Arc<MemoryStore>>,
    pub connects: AtomicUsize,
    /// Widens the window in which concurrent first opens can race
    pub connect_delay: Option<Duration>,
}

impl CountingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, tenant_id: &str, store: Arc<MemoryStore>) -> Self {
        self.stores.insert(tenant_id.to_string(), store);
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantConnector for CountingConnector {
    async fn connect(&self, tenant_id: &str, _storage_location: &str) -> Result<Arc<dyn TenantStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        match self.stores.get(tenant_id) {
            Some(store) => Ok(Arc::clone(store) as Arc<dyn TenantStore>),
            None => bail!("no storage for tenant {tenant_id}"),
        }
    }
}

/// Fixed host-to-tenant table.
#[derive(Default)]
pub struct StaticDirectory {
    tenants: Mutex<HashMap<String, String>>,
    domains: Mutex<HashMap<String, (String, bool)>>,
    pub domain_lookups: AtomicUsize,
    pub fail_domain_lookups: AtomicBool,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(self, tenant_id: &str) -> Self {
        self.tenants
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), format!("memory://{tenant_id}"));
        self
    }

    pub fn with_domain(self, domain: &str, tenant_id: &str, verified: bool) -> Self {
        self.domains
            .lock()
            .unwrap()
            .insert(domain.to_string(), (tenant_id.to_string(), verified));
        self
    }

    pub fn lookups(&self) -> usize {
        self.domain_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantDirectory for StaticDirectory {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Verified domains resolve even when their tenant has no storage location
    async fn lookup_by_domain(&self, host: &str) -> Result<Option<TenantRecord>> {
        self.domain_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_domain_lookups.load(Ordering::SeqCst) {
            bail!("connection reset by peer");
        }
        let tenant_id = match self.domains.lock().unwrap().get(host) {
            Some((tenant_id, true)) => tenant_id.clone(),
            _ => return Ok(None),
        };
        let storage_location = self
            .tenants
            .lock()
            .unwrap()
            .get(&tenant_id)
            .cloned()
            .unwrap_or_else(|| format!("memory://{tenant_id}"));
        Ok(Some(TenantRecord {
            id: tenant_id,
            storage_location,
        }))
    }

    async fn lookup_by_id(&self, tenant_id: &str) -> Result<Option<String>> {
        Ok(self.tenants.lock().unwrap().get(tenant_id).cloned())
    }

    async fn upsert_tenant(&self, tenant: &TenantRecord, _name: &str) -> Result<()> {
        self.tenants
            .lock()
            .unwrap()
            .insert(tenant.id.clone(), tenant.storage_location.clone());
        Ok(())
    }

    async fn upsert_domain(&self, domain: &str, tenant_id: &str, verified: bool) -> Result<()> {
        self.domains
            .lock()
            .unwrap()
            .insert(domain.to_string(), (tenant_id.to_string(), verified));
        Ok(())
    }
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
pub struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
pub struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));
        self.inner.call(req)
    }
}
