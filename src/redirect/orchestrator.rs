//! Per-request redirect pipeline.
//!
//! resolve tenant -> load link (cache, then tenant storage) -> check status
//! -> evaluate routing rules -> dispatch click recording -> emit redirect.
//! Any step can end the request with an [`AppError`].

use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analytics::{ClickRecorder, GeoResolver, KeywordUserAgentParser, NoopGeoResolver, UserAgentParser};
use crate::config::{CacheConfig, DomainsConfig};
use crate::error::{AppError, AppResult};
use crate::links;
use crate::models::{CachedLinkSnapshot, RedirectKind, RequestContext, TenantId, UtmParams};
use crate::storage::TenantDirectory;
use crate::tenant::TenantConnectionRegistry;

use super::domain_resolver::DomainResolver;
use super::link_cache::LinkCache;

/// What the HTTP layer extracted from an inbound redirect request.
#[derive(Debug, Clone)]
pub struct RedirectRequest {
    /// Raw host, possibly with a port
    pub host: String,
    pub short_code: String,
    pub client_ip: IpAddr,
    pub user_agent: String,
    pub referrer: Option<String>,
    pub query: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    pub location: String,
    pub kind: RedirectKind,
    pub cache_hit: bool,
}

/// Owns the caches and collaborators used to serve redirects.
pub struct RedirectService {
    domains: DomainsConfig,
    directory: Arc<dyn TenantDirectory>,
    domain_resolver: DomainResolver,
    registry: Arc<TenantConnectionRegistry>,
    link_cache: LinkCache,
    geo: Arc<dyn GeoResolver>,
    user_agents: Arc<dyn UserAgentParser>,
    recorder: Arc<ClickRecorder>,
}

impl RedirectService {
    pub fn new(
        domains: DomainsConfig,
        cache: &CacheConfig,
        directory: Arc<dyn TenantDirectory>,
        registry: Arc<TenantConnectionRegistry>,
    ) -> Self {
        Self {
            domains,
            domain_resolver: DomainResolver::new(Arc::clone(&directory), cache.domain_ttl()),
            directory,
            registry,
            link_cache: LinkCache::new(cache.link_ttl()),
            geo: Arc::new(NoopGeoResolver),
            user_agents: Arc::new(KeywordUserAgentParser),
            recorder: Arc::new(ClickRecorder::unbounded()),
        }
    }

    pub fn with_geo_resolver(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_user_agent_parser(mut self, parser: Arc<dyn UserAgentParser>) -> Self {
        self.user_agents = parser;
        self
    }

    pub fn with_click_recorder(mut self, recorder: Arc<ClickRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn recorder(&self) -> &Arc<ClickRecorder> {
        &self.recorder
    }

    pub fn registry(&self) -> &Arc<TenantConnectionRegistry> {
        &self.registry
    }

    pub fn link_cache(&self) -> &LinkCache {
        &self.link_cache
    }

    pub async fn resolve(&self, request: RedirectRequest) -> AppResult<RedirectOutcome> {
        if request.short_code.is_empty() {
            return Err(AppError::NotFound);
        }

        let tenant_id = self.resolve_tenant(&request.host).await?;

        let storage_location = self
            .directory
            .lookup_by_id(&tenant_id)
            .await
            .with_context(|| format!("failed to load tenant {tenant_id}"))?
            .ok_or_else(|| anyhow!("tenant {tenant_id} has no storage location"))?;

        let (snapshot, cache_hit) = self
            .load_link(&tenant_id, &storage_location, &request.short_code)
            .await?;

        // Status can change between cache fills, so it is checked on every hit
        if !snapshot.is_active() {
            return Err(AppError::Gone);
        }

        let context = self.build_context(&request);
        let location = links::evaluate(snapshot.rules.as_deref(), &context)
            .unwrap_or(&snapshot.destination_url)
            .to_string();

        match self.registry.get(&tenant_id, &storage_location).await {
            Ok(store) => self.recorder.record(
                store,
                &snapshot.link_id,
                &snapshot.short_code,
                &location,
                context,
                UtmParams::from_query(&request.query),
            ),
            Err(err) => {
                warn!(tenant_id = %tenant_id, error = %err, "tenant storage unavailable, click not recorded");
            }
        }

        Ok(RedirectOutcome {
            location,
            kind: snapshot.redirect_kind,
            cache_hit,
        })
    }

    async fn resolve_tenant(&self, raw_host: &str) -> AppResult<TenantId> {
        let host = normalize_host(raw_host);
        if host == self.domains.shared_domain {
            return Ok(self.domains.system_tenant_id.clone());
        }

        self.domain_resolver
            .resolve(&host)
            .await
            .with_context(|| format!("failed to resolve host {host}"))?
            .ok_or(AppError::NotFound)
    }

    async fn load_link(
        &self,
        tenant_id: &str,
        storage_location: &str,
        short_code: &str,
    ) -> AppResult<(Arc<CachedLinkSnapshot>, bool)> {
        if let Some(snapshot) = self.link_cache.get(tenant_id, short_code) {
            return Ok((snapshot, true));
        }

        let store = self.registry.get(tenant_id, storage_location).await?;
        let link = store
            .get_link_by_short_code(short_code)
            .await?
            .ok_or(AppError::NotFound)?;

        debug!(tenant_id = %tenant_id, short_code = %short_code, "link cache filled");
        let snapshot = self
            .link_cache
            .put(tenant_id, short_code, CachedLinkSnapshot::from_link(&link));

        Ok((snapshot, false))
    }

    fn build_context(&self, request: &RedirectRequest) -> RequestContext {
        let parsed = self.user_agents.parse(&request.user_agent);
        RequestContext {
            client_ip: request.client_ip,
            user_agent: request.user_agent.clone(),
            country_code: self.geo.lookup_country(request.client_ip),
            device_class: parsed.device,
            os: parsed.os,
            browser: parsed.browser,
            referrer: request.referrer.clone().filter(|r| !r.is_empty()),
            requested_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Lower-case the host and drop any port. Bracketed IPv6 literals keep their address.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let host = match raw.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or(rest),
        None => raw.split(':').next().unwrap_or(raw),
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}
