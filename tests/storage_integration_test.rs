//! End-to-end tests over real SQLite files: directory, tenant stores,
//! link management and the redirect router together.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use common::TestConnectInfoLayer;
use trackr::config::{AnalyticsConfig, CacheConfig, DomainsConfig, TenantDbConfig};
use trackr::error::AppError;
use trackr::links::service;
use trackr::models::{LinkStatus, NewLink, RoutingRules, TenantRecord};
use trackr::redirect::{create_redirect_router, RedirectService};
use trackr::storage::{SqliteTenantConnector, SqliteTenantDirectory, TenantConnector, TenantDirectory};
use trackr::tenant::TenantConnectionRegistry;

struct Fixture {
    _dir: tempfile::TempDir,
    directory: Arc<SqliteTenantDirectory>,
    registry: Arc<TenantConnectionRegistry>,
    tenant_location: String,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let directory_url = format!("sqlite://{}", dir.path().join("global.db").display());
    let tenant_location = format!("sqlite://{}", dir.path().join("t1.db").display());

    let directory = Arc::new(SqliteTenantDirectory::new(&directory_url, 5).await.unwrap());
    directory.init().await.unwrap();
    directory
        .upsert_tenant(
            &TenantRecord {
                id: "t1".to_string(),
                storage_location: tenant_location.clone(),
            },
            "Corp",
        )
        .await
        .unwrap();
    directory
        .upsert_domain("go.corp.example", "t1", true)
        .await
        .unwrap();

    let registry = Arc::new(TenantConnectionRegistry::new(Arc::new(
        SqliteTenantConnector::new(TenantDbConfig::default()),
    )));

    Fixture {
        _dir: dir,
        directory,
        registry,
        tenant_location,
    }
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::HOST, "go.corp.example")
        .header(header::USER_AGENT, "Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_created_link_redirects_and_counts_clicks() {
    let f = fixture().await;
    let store = f.registry.get("t1", &f.tenant_location).await.unwrap();

    let created = service::create_link(
        store.as_ref(),
        NewLink {
            destination_url: "https://vendor.example/x".to_string(),
            custom_code: Some("promo".to_string()),
            rules: Some(RoutingRules {
                device: Some(HashMap::from([(
                    "mobile".to_string(),
                    "https://m.vendor.example/x".to_string(),
                )])),
                geo: None,
            }),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(created.short_code, "promo");

    let service = Arc::new(RedirectService::new(
        DomainsConfig::default(),
        &CacheConfig::default(),
        f.directory.clone(),
        Arc::clone(&f.registry),
    ));
    let app = create_redirect_router(Arc::clone(&service), AnalyticsConfig::default())
        .layer(TestConnectInfoLayer);

    let response = app
        .clone()
        .oneshot(get("/promo?utm_source=qr"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://m.vendor.example/x"
    );

    assert!(service.recorder().wait_idle(Duration::from_secs(5)).await);
    let link = store.get_link_by_short_code("promo").await.unwrap().unwrap();
    assert_eq!(link.click_count, 1);
    assert!(link.last_click_at.is_some());

    // Pausing takes effect once the cached snapshot is gone
    service::set_status(store.as_ref(), "promo", LinkStatus::Paused)
        .await
        .unwrap();
    let fresh_service = Arc::new(RedirectService::new(
        DomainsConfig::default(),
        &CacheConfig::default(),
        f.directory.clone(),
        Arc::clone(&f.registry),
    ));
    let fresh_app = create_redirect_router(fresh_service, AnalyticsConfig::default())
        .layer(TestConnectInfoLayer);
    let response = fresh_app.oneshot(get("/promo")).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_generated_codes_and_custom_conflicts() {
    let f = fixture().await;
    let store = f.registry.get("t1", &f.tenant_location).await.unwrap();

    let generated = service::create_link(
        store.as_ref(),
        NewLink {
            destination_url: "https://vendor.example/a".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(generated.short_code.len(), 7);
    assert!(generated.short_code.chars().all(|c| c.is_ascii_alphanumeric()));

    let duplicate = service::create_link(
        store.as_ref(),
        NewLink {
            destination_url: "https://vendor.example/b".to_string(),
            custom_code: Some(generated.short_code.clone()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let reserved = service::create_link(
        store.as_ref(),
        NewLink {
            destination_url: "https://vendor.example/c".to_string(),
            custom_code: Some("admin".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(reserved, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_archive_expired_removes_links_from_service() {
    let f = fixture().await;
    let store = f.registry.get("t1", &f.tenant_location).await.unwrap();

    service::create_link(
        store.as_ref(),
        NewLink {
            destination_url: "https://vendor.example/sale".to_string(),
            custom_code: Some("sale".to_string()),
            expires_at: Some(chrono::Utc::now().timestamp() - 60),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(service::archive_expired(store.as_ref()).await.unwrap(), 1);
    assert_eq!(service::archive_expired(store.as_ref()).await.unwrap(), 0);

    let service = Arc::new(RedirectService::new(
        DomainsConfig::default(),
        &CacheConfig::default(),
        f.directory.clone(),
        Arc::clone(&f.registry),
    ));
    let app = create_redirect_router(service, AnalyticsConfig::default())
        .layer(TestConnectInfoLayer);
    let response = app.oneshot(get("/sale")).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_connector_creates_tenant_database() {
    let f = fixture().await;
    let connector = SqliteTenantConnector::new(TenantDbConfig::default());

    let store = connector.connect("t1", &f.tenant_location).await.unwrap();
    assert!(!store.exists_by_short_code("promo").await.unwrap());
    store.close().await;

    assert_eq!(
        f.directory.lookup_by_id("t1").await.unwrap().as_deref(),
        Some(f.tenant_location.as_str())
    );
}
