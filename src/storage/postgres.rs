use crate::models::TenantRecord;
use crate::storage::TenantDirectory;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

/// Tenant directory backed by a shared PostgreSQL database.
pub struct PostgresTenantDirectory {
    pool: Arc<PgPool>,
}

impl PostgresTenantDirectory {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl TenantDirectory for PostgresTenantDirectory {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                db_file_path TEXT NOT NULL,
                created_at BIGINT NOT NULL
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
                verified BOOLEAN NOT NULL DEFAULT FALSE,
                created_at BIGINT NOT NULL
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
            WHERE d.domain = $1 AND d.verified
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
        let location =
            sqlx::query_scalar::<_, String>("SELECT db_file_path FROM organizations WHERE id = $1")
                .bind(tenant_id)
                .fetch_optional(self.pool.as_ref())
                .await?;

        Ok(location)
    }

    async fn upsert_tenant(&self, tenant: &TenantRecord, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, slug, name, db_file_path, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, db_file_path = EXCLUDED.db_file_path
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (domain) DO UPDATE
            SET organization_id = EXCLUDED.organization_id, verified = EXCLUDED.verified
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
