use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trackr::config::{Config, DatabaseBackend};
use trackr::links::service;
use trackr::models::{LinkStatus, NewLink, RoutingRules, TenantRecord};
use trackr::storage::{
    PostgresTenantDirectory, SqliteTenantConnector, SqliteTenantDirectory, TenantConnector,
    TenantDirectory, TenantStore,
};

#[derive(Parser)]
#[command(name = "trackr-admin")]
#[command(about = "Trackr tenant and link management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tenant directory tables
    InitDirectory,
    /// Register a tenant or move its storage
    AddTenant {
        /// Tenant ID
        #[arg(long)]
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Storage location, e.g. sqlite://./data/tenants/acme.db
        #[arg(long)]
        storage: String,
    },
    /// Attach a custom domain to a tenant
    AddDomain {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        domain: String,
        /// Mark the domain as verified so it resolves immediately
        #[arg(long)]
        verified: bool,
    },
    /// Create a short link in a tenant
    CreateLink {
        #[arg(long)]
        tenant: String,
        /// Destination URL
        #[arg(long)]
        url: String,
        /// Custom short code; generated when omitted
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        title: Option<String>,
        /// Issue 301 instead of 302
        #[arg(long)]
        permanent: bool,
        /// Device override, e.g. mobile=https://m.example.com (repeatable)
        #[arg(long = "device", value_name = "CLASS=URL")]
        device_rules: Vec<String>,
        /// Country override, e.g. US=https://us.example.com (repeatable)
        #[arg(long = "geo", value_name = "COUNTRY=URL")]
        geo_rules: Vec<String>,
        /// Unix timestamp after which `archive-expired` archives the link
        #[arg(long)]
        expires_at: Option<i64>,
    },
    /// Change a link's status (active, paused, archived)
    SetStatus {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        status: LinkStatus,
    },
    /// Archive every active link whose expiry has passed
    ArchiveExpired {
        #[arg(long)]
        tenant: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let directory: Arc<dyn TenantDirectory> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteTenantDirectory::new(&config.database.url, config.database.max_connections)
                .await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresTenantDirectory::new(&config.database.url, config.database.max_connections)
                .await?,
        ),
    };

    // Ensure directory tables exist
    directory.init().await?;

    let connector = SqliteTenantConnector::new(config.tenant_db.clone());

    match cli.command {
        Commands::InitDirectory => {
            println!("✓ Tenant directory initialised at {}", config.database.url);
        }
        Commands::AddTenant { id, name, storage } => {
            let tenant = TenantRecord {
                id,
                storage_location: storage,
            };
            directory.upsert_tenant(&tenant, &name).await?;
            // Opening the store creates the file and schema up front
            connector
                .connect(&tenant.id, &tenant.storage_location)
                .await?
                .close()
                .await;
            println!(
                "✓ Tenant '{}' stored at {}",
                tenant.id, tenant.storage_location
            );
        }
        Commands::AddDomain {
            tenant,
            domain,
            verified,
        } => {
            if directory.lookup_by_id(&tenant).await?.is_none() {
                bail!("unknown tenant '{tenant}'");
            }
            directory.upsert_domain(&domain, &tenant, verified).await?;
            let state = if verified { "verified" } else { "unverified" };
            println!("✓ Domain '{}' ({}) attached to tenant '{}'", domain, state, tenant);
        }
        Commands::CreateLink {
            tenant,
            url,
            code,
            title,
            permanent,
            device_rules,
            geo_rules,
            expires_at,
        } => {
            let rules = RoutingRules {
                device: parse_rule_pairs(&device_rules, |k| k.to_lowercase())?,
                geo: parse_rule_pairs(&geo_rules, |k| k.to_uppercase())?,
            };
            let request = NewLink {
                destination_url: url,
                custom_code: code,
                title,
                redirect_kind: Some(if permanent { "permanent" } else { "temporary" }.to_string()),
                rules: (rules.device.is_some() || rules.geo.is_some()).then_some(rules),
                expires_at,
            };

            let store = open_tenant(directory.as_ref(), &connector, &tenant).await?;
            let result = service::create_link(store.as_ref(), request).await;
            store.close().await;

            let link = result?;
            println!(
                "✓ Created /{} -> {} ({})",
                link.short_code,
                link.destination_url,
                link.redirect_kind.as_str()
            );
        }
        Commands::SetStatus {
            tenant,
            code,
            status,
        } => {
            let store = open_tenant(directory.as_ref(), &connector, &tenant).await?;
            let result = service::set_status(store.as_ref(), &code, status).await;
            store.close().await;

            result?;
            println!("✓ Link '{}' is now {}", code, status);
        }
        Commands::ArchiveExpired { tenant } => {
            let store = open_tenant(directory.as_ref(), &connector, &tenant).await?;
            let result = service::archive_expired(store.as_ref()).await;
            store.close().await;

            println!("✓ Archived {} expired link(s)", result?);
        }
    }

    Ok(())
}

async fn open_tenant(
    directory: &dyn TenantDirectory,
    connector: &SqliteTenantConnector,
    tenant_id: &str,
) -> Result<Arc<dyn TenantStore>> {
    let location = directory
        .lookup_by_id(tenant_id)
        .await?
        .with_context(|| format!("unknown tenant '{tenant_id}'"))?;
    connector.connect(tenant_id, &location).await
}

/// Parse repeated `KEY=URL` arguments. No arguments means no rule map.
fn parse_rule_pairs(
    pairs: &[String],
    normalize_key: impl Fn(&str) -> String,
) -> Result<Option<HashMap<String, String>>> {
    if pairs.is_empty() {
        return Ok(None);
    }

    let mut map = HashMap::with_capacity(pairs.len());
    for pair in pairs {
        let Some((key, url)) = pair.split_once('=') else {
            bail!("expected KEY=URL, got '{pair}'");
        };
        map.insert(normalize_key(key.trim()), url.trim().to_string());
    }
    Ok(Some(map))
}
