//! Link creation and lifecycle operations against a tenant store.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::links::shortcode;
use crate::models::{Link, LinkStatus, NewLink, RedirectKind};
use crate::storage::TenantStore;

/// Destinations must be absolute `http`/`https` URLs without control characters.
///
/// Returns the URL in its serialized form, which is plain ASCII and safe to
/// put in a `Location` header.
pub fn validate_destination(destination: &str) -> AppResult<String> {
    if destination.trim().is_empty() {
        return Err(AppError::Validation("destination URL is required".to_string()));
    }

    // The parser silently drops tabs and newlines; refuse them instead
    if destination.chars().any(char::is_control) {
        return Err(AppError::Validation(
            "destination URL contains control characters".to_string(),
        ));
    }

    let url = url::Url::parse(destination)
        .map_err(|e| AppError::Validation(format!("invalid destination URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url.into()),
        other => Err(AppError::Validation(format!(
            "destination URL must use http or https, got '{other}'"
        ))),
    }
}

/// Validate the request, allocate a short code and persist a new active link.
pub async fn create_link(store: &dyn TenantStore, mut request: NewLink) -> AppResult<Link> {
    let destination_url = validate_destination(&request.destination_url)?;
    let redirect_kind: RedirectKind = request.redirect_kind.as_deref().unwrap_or("").parse()?;

    if let Some(rules) = request.rules.as_mut() {
        for url in rules
            .device
            .iter_mut()
            .chain(rules.geo.iter_mut())
            .flat_map(|m| m.values_mut())
        {
            *url = validate_destination(url)?;
        }
    }

    let short_code = shortcode::allocate(request.custom_code.as_deref(), store).await?;

    let now = chrono::Utc::now().timestamp();
    let link = Link {
        id: Uuid::new_v4().to_string(),
        short_code,
        destination_url,
        title: request.title,
        redirect_kind,
        rules: request.rules,
        status: LinkStatus::Active,
        expires_at: request.expires_at,
        click_count: 0,
        last_click_at: None,
        created_at: now,
        updated_at: now,
    };

    // The unique index still guards against a concurrent insert of the same code
    store.insert_link(&link).await?;
    tracing::info!(short_code = %link.short_code, link_id = %link.id, "created link");

    Ok(link)
}

pub async fn set_status(
    store: &dyn TenantStore,
    short_code: &str,
    status: LinkStatus,
) -> AppResult<()> {
    if store.update_link_status(short_code, status).await? {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

/// Archive every active link whose expiry has passed. Returns how many changed.
pub async fn archive_expired(store: &dyn TenantStore) -> AppResult<u64> {
    let archived = store.archive_expired(chrono::Utc::now().timestamp()).await?;
    if archived > 0 {
        tracing::info!(archived, "archived expired links");
    }
    Ok(archived)
}
