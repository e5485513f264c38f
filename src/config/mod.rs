use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub tenant_db: TenantDbConfig,
    pub redirect_server: ServerConfig,
    pub domains: DomainsConfig,
    pub cache: CacheConfig,
    pub analytics: AnalyticsConfig,
}

/// Global tenant directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

/// Bounds applied to every per-tenant connection pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDbConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl Default for TenantDbConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            idle_timeout_secs: 600,
            max_lifetime_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainsConfig {
    /// Host served for every tenant-less link, routed to `system_tenant_id`
    pub shared_domain: String,
    pub system_tenant_id: String,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            shared_domain: "trackr.link".to_string(),
            system_tenant_id: "system_shared".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub link_ttl_secs: u64,
    pub domain_ttl_secs: u64,
}

impl CacheConfig {
    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link_ttl_secs)
    }

    pub fn domain_ttl(&self) -> Duration {
        Duration::from_secs(self.domain_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            link_ttl_secs: 300,
            domain_ttl_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket peer address only
    #[default]
    None,
    /// Honour `Forwarded` / `X-Forwarded-For`
    Standard,
    /// Honour `CF-Connecting-IP`
    Cloudflare,
}

impl FromStr for TrustedProxyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TrustedProxyMode::None),
            "standard" => Ok(TrustedProxyMode::Standard),
            "cloudflare" => Ok(TrustedProxyMode::Cloudflare),
            other => anyhow::bail!(
                "unknown TRUSTED_PROXY_MODE '{other}', supported values: none, standard, cloudflare"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsConfig {
    /// MaxMind City or Country database; geo routing is disabled when unset
    pub geoip_db_path: Option<String>,
    pub trusted_proxy_mode: TrustedProxyMode,
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
    /// Cap on concurrently running click recordings; unbounded when unset
    pub click_max_in_flight: Option<usize>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn env_parse_opt<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        _ => Ok(None),
    }
}

/// Parse a comma separated CIDR list; bare addresses are treated as host routes.
pub fn parse_trusted_proxies(raw: &str) -> anyhow::Result<Vec<IpNet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid trusted proxy '{entry}'"))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env_or("DATABASE_BACKEND", "sqlite").to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
                );
                DatabaseBackend::Sqlite
            }
        };

        let tenant_defaults = TenantDbConfig::default();
        let cache_defaults = CacheConfig::default();
        let domain_defaults = DomainsConfig::default();

        let trusted_proxy_mode = env_or("TRUSTED_PROXY_MODE", "none").parse()?;
        let trusted_proxies = parse_trusted_proxies(&env_or("TRUSTED_PROXIES", ""))?;

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: env_or("DATABASE_URL", "sqlite://./data/global.db"),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            tenant_db: TenantDbConfig {
                max_connections: env_parse(
                    "TENANT_DB_MAX_CONNECTIONS",
                    tenant_defaults.max_connections,
                )?,
                min_connections: env_parse(
                    "TENANT_DB_MIN_CONNECTIONS",
                    tenant_defaults.min_connections,
                )?,
                idle_timeout_secs: env_parse(
                    "TENANT_DB_IDLE_TIMEOUT_SECS",
                    tenant_defaults.idle_timeout_secs,
                )?,
                max_lifetime_secs: env_parse(
                    "TENANT_DB_MAX_LIFETIME_SECS",
                    tenant_defaults.max_lifetime_secs,
                )?,
            },
            redirect_server: ServerConfig {
                host: env_or("REDIRECT_HOST", "127.0.0.1"),
                port: env_parse("REDIRECT_PORT", 3000)?,
            },
            domains: DomainsConfig {
                shared_domain: env_or("SHARED_DOMAIN", &domain_defaults.shared_domain)
                    .to_lowercase(),
                system_tenant_id: env_or("SYSTEM_TENANT_ID", &domain_defaults.system_tenant_id),
            },
            cache: CacheConfig {
                link_ttl_secs: env_parse("LINK_CACHE_TTL_SECS", cache_defaults.link_ttl_secs)?,
                domain_ttl_secs: env_parse(
                    "DOMAIN_CACHE_TTL_SECS",
                    cache_defaults.domain_ttl_secs,
                )?,
            },
            analytics: AnalyticsConfig {
                geoip_db_path: std::env::var("GEOIP_DB_PATH").ok().filter(|p| !p.is_empty()),
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies: env_parse_opt("NUM_TRUSTED_PROXIES")?,
                click_max_in_flight: env_parse_opt("CLICK_MAX_IN_FLIGHT")?,
            },
        })
    }
}
