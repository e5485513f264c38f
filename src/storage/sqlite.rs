use crate::config::TenantDbConfig;
use crate::models::{ClickEvent, Link, LinkStatus, RoutingRules, TenantRecord};
use crate::storage::{
    StorageError, StorageResult, TenantConnector, TenantDirectory, TenantStore,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Raw `links` row; enum and JSON columns are decoded in `TryFrom`.
#[derive(Debug, FromRow)]
struct LinkRow {
    id: String,
    short_code: String,
    destination_url: String,
    title: Option<String>,
    redirect_type: String,
    rules: Option<String>,
    status: String,
    expires_at: Option<i64>,
    click_count: i64,
    last_click_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<LinkRow> for Link {
    type Error = anyhow::Error;

    fn try_from(row: LinkRow) -> Result<Self> {
        let rules = match row.rules.as_deref() {
            None | Some("") => None,
            Some(raw) => serde_json::from_str::<Option<RoutingRules>>(raw)
                .with_context(|| format!("corrupt routing rules for link {}", row.id))?,
        };

        Ok(Link {
            redirect_kind: row.redirect_type.parse()?,
            status: row.status.parse()?,
            id: row.id,
            short_code: row.short_code,
            destination_url: row.destination_url,
            title: row.title,
            rules,
            expires_at: row.expires_at,
            click_count: row.click_count,
            last_click_at: row.last_click_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const LINK_COLUMNS: &str = "id, short_code, destination_url, title, redirect_type, rules, status, \
     expires_at, click_count, last_click_at, created_at, updated_at";

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A single tenant's database: one bounded pool reused for the registry's lifetime.
pub struct SqliteTenantStore {
    pool: Arc<SqlitePool>,
}

impl SqliteTenantStore {
    pub async fn connect(storage_location: &str, config: &TenantDbConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(storage_location)
            .with_context(|| format!("invalid tenant storage location '{storage_location}'"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .max_lifetime(Some(Duration::from_secs(config.max_lifetime_secs)))
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open tenant database '{storage_location}'"))?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl TenantStore for SqliteTenantStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id TEXT PRIMARY KEY,
                short_code TEXT NOT NULL UNIQUE,
                destination_url TEXT NOT NULL,
                title TEXT,
                redirect_type TEXT NOT NULL DEFAULT 'temporary',
                rules TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                expires_at INTEGER,
                click_count INTEGER NOT NULL DEFAULT 0,
                last_click_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id TEXT PRIMARY KEY,
                link_id TEXT NOT NULL,
                short_code TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                ip_address TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                country_code TEXT,
                device_type TEXT NOT NULL,
                os TEXT NOT NULL,
                browser TEXT NOT NULL,
                referrer TEXT,
                referrer_domain TEXT,
                utm_source TEXT,
                utm_medium TEXT,
                utm_campaign TEXT,
                destination_url TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clicks_link_time ON clicks(link_id, timestamp)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_expiry ON links(status, expires_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn get_link_by_short_code(&self, short_code: &str) -> Result<Option<Link>> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE short_code = ?"
        ))
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Link::try_from).transpose()
    }

    async fn exists_by_short_code(&self, short_code: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM links WHERE short_code = ?)",
        )
        .bind(short_code)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists != 0)
    }

    async fn insert_link(&self, link: &Link) -> StorageResult<()> {
        let rules = link
            .rules
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Other(e.into()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO links (
                id, short_code, destination_url, title, redirect_type, rules, status,
                expires_at, click_count, last_click_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(short_code) DO NOTHING
            "#,
        )
        .bind(&link.id)
        .bind(&link.short_code)
        .bind(&link.destination_url)
        .bind(&link.title)
        .bind(link.redirect_kind.as_str())
        .bind(rules)
        .bind(link.status.as_str())
        .bind(link.expires_at)
        .bind(link.click_count)
        .bind(link.last_click_at)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(())
    }

    async fn update_link_status(&self, short_code: &str, status: LinkStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE links
            SET status = ?, updated_at = ?
            WHERE short_code = ?
            "#,
        )
        .bind(status.as_str())
        .bind(unix_now())
        .bind(short_code)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn archive_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE links
            SET status = 'archived', updated_at = ?
            WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_click(&self, event: &ClickEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clicks (
                id, link_id, short_code, timestamp, ip_address, user_agent,
                country_code, device_type, os, browser, referrer, referrer_domain,
                utm_source, utm_medium, utm_campaign, destination_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.link_id)
        .bind(&event.short_code)
        .bind(event.timestamp)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.country_code)
        .bind(event.device_class.as_str())
        .bind(&event.os)
        .bind(&event.browser)
        .bind(&event.referrer)
        .bind(&event.referrer_domain)
        .bind(&event.utm.utm_source)
        .bind(&event.utm.utm_medium)
        .bind(&event.utm.utm_campaign)
        .bind(&event.destination_url)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn increment_click_counter(&self, link_id: &str, clicked_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE links
            SET click_count = click_count + 1, last_click_at = ?
            WHERE id = ?
            "#,
        )
        .bind(clicked_at)
        .bind(link_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Opens per-tenant SQLite files with the configured pool bounds and ensures the schema exists.
pub struct SqliteTenantConnector {
    config: TenantDbConfig,
}

impl SqliteTenantConnector {
    pub fn new(config: TenantDbConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TenantConnector for SqliteTenantConnector {
    async fn connect(
        &self,
        tenant_id: &str,
        storage_location: &str,
    ) -> Result<Arc<dyn TenantStore>> {
        let store = SqliteTenantStore::connect(storage_location, &self.config).await?;
        store
            .init()
            .await
            .with_context(|| format!("failed to initialise schema for tenant {tenant_id}"))?;
        Ok(Arc::new(store))
    }
}

/// Tenant directory backed by the global SQLite database.
pub struct SqliteTenantDirectory {
    pool: Arc<SqlitePool>,
}

impl SqliteTenantDirectory {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        self.pool.as_ref()
    }
}

#[async_trait]
impl TenantDirectory for SqliteTenantDirectory {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                db_file_path TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS domains (
                domain TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                verified INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn lookup_by_domain(&self, host: &str) -> Result<Option<TenantRecord>> {
        let record = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT o.id, o.db_file_path
            FROM domains d
            JOIN organizations o ON o.id = d.organization_id
            WHERE d.domain = ? AND d.verified = 1
            "#,
        )
        .bind(host)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(|(id, storage_location)| TenantRecord {
            id,
            storage_location,
        });

        Ok(record)
    }

    async fn lookup_by_id(&self, tenant_id: &str) -> Result<Option<String>> {
        let location = sqlx::query_scalar::<_, String>(
            "SELECT db_file_path FROM organizations WHERE id = ?",
        )
        .bind(tenant_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(location)
    }

    async fn upsert_tenant(&self, tenant: &TenantRecord, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, slug, name, db_file_path, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name, db_file_path = excluded.db_file_path
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.id)
        .bind(name)
        .bind(&tenant.storage_location)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn upsert_domain(&self, domain: &str, tenant_id: &str, verified: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO domains (domain, organization_id, verified, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (domain) DO UPDATE
            SET organization_id = excluded.organization_id, verified = excluded.verified
            "#,
        )
        .bind(domain.to_lowercase())
        .bind(tenant_id)
        .bind(verified)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}
