use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trackr::analytics::{ClickRecorder, GeoResolver, MaxMindGeoResolver, NoopGeoResolver};
use trackr::config::{Config, DatabaseBackend, TrustedProxyMode};
use trackr::redirect::{create_redirect_router, RedirectService};
use trackr::storage::{
    PostgresTenantDirectory, SqliteTenantConnector, SqliteTenantDirectory, TenantDirectory,
};
use trackr::tenant::TenantConnectionRegistry;

/// How long shutdown waits for detached click recordings
const CLICK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let directory: Arc<dyn TenantDirectory> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite tenant directory: {}", config.database.url);
            Arc::new(
                SqliteTenantDirectory::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL tenant directory: {}", config.database.url);
            Arc::new(
                PostgresTenantDirectory::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };
    directory
        .init()
        .await
        .context("failed to initialise tenant directory")?;

    let registry = Arc::new(TenantConnectionRegistry::new(Arc::new(
        SqliteTenantConnector::new(config.tenant_db.clone()),
    )));

    let geo: Arc<dyn GeoResolver> = match config.analytics.geoip_db_path.as_deref() {
        Some(path) => {
            info!("Loading GeoIP database from {}", path);
            Arc::new(MaxMindGeoResolver::open(path)?)
        }
        None => {
            warn!("GEOIP_DB_PATH not set, geo routing rules will never match");
            Arc::new(NoopGeoResolver)
        }
    };

    if config.analytics.trusted_proxy_mode == TrustedProxyMode::None {
        info!("Trusted proxy mode is none, using socket addresses as client IPs");
    }

    let recorder = Arc::new(ClickRecorder::new(config.analytics.click_max_in_flight));

    let service = Arc::new(
        RedirectService::new(
            config.domains.clone(),
            &config.cache,
            Arc::clone(&directory),
            Arc::clone(&registry),
        )
        .with_geo_resolver(geo)
        .with_click_recorder(Arc::clone(&recorder)),
    );

    let router = create_redirect_router(Arc::clone(&service), config.analytics.clone());

    let addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Redirect server listening on http://{}", addr);
    info!(
        "Shared domain {} routes to tenant {}",
        config.domains.shared_domain, config.domains.system_tenant_id
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!(in_flight = recorder.in_flight(), "Draining click recordings");
    if !recorder.wait_idle(CLICK_DRAIN_TIMEOUT).await {
        warn!(
            in_flight = recorder.in_flight(),
            "Click recordings still pending at shutdown"
        );
    }
    registry.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
