use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use uuid::Uuid;

use super::DeviceClass;

/// Per-request facts used for rule evaluation and click recording. Never persisted as-is.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_ip: IpAddr,
    pub user_agent: String,
    pub country_code: Option<String>,
    pub device_class: DeviceClass,
    pub os: String,
    pub browser: String,
    pub referrer: Option<String>,
    /// Unix timestamp in milliseconds
    pub requested_at: i64,
}

/// Campaign parameters passed through from the redirect query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
}

impl UtmParams {
    /// Picks the three recognised keys out of a parsed query; empty values count as absent.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let pick = |key: &str| query.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            utm_source: pick("utm_source"),
            utm_medium: pick("utm_medium"),
            utm_campaign: pick("utm_campaign"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.utm_source.is_none() && self.utm_medium.is_none() && self.utm_campaign.is_none()
    }
}

/// A single visit, written once by the click recorder.
#[derive(Debug, Clone, Serialize)]
pub struct ClickEvent {
    pub id: String,
    pub link_id: String,
    pub short_code: String,
    pub timestamp: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub country_code: Option<String>,
    pub device_class: DeviceClass,
    pub os: String,
    pub browser: String,
    pub referrer: Option<String>,
    pub referrer_domain: Option<String>,
    pub utm: UtmParams,
    pub destination_url: String,
}

impl ClickEvent {
    pub fn new(
        link_id: &str,
        short_code: &str,
        destination_url: &str,
        context: &RequestContext,
        utm: UtmParams,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            link_id: link_id.to_string(),
            short_code: short_code.to_string(),
            timestamp: context.requested_at,
            ip_address: context.client_ip.to_string(),
            user_agent: context.user_agent.clone(),
            country_code: context.country_code.clone(),
            device_class: context.device_class,
            os: context.os.clone(),
            browser: context.browser.clone(),
            referrer: context.referrer.clone(),
            referrer_domain: context.referrer.as_deref().and_then(referrer_domain),
            utm,
            destination_url: destination_url.to_string(),
        }
    }
}

fn referrer_domain(referrer: &str) -> Option<String> {
    url::Url::parse(referrer)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}
