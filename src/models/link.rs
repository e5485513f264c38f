use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Returned when a stored or user-supplied enum value is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {field} '{value}'")]
pub struct ParseFieldError {
    pub field: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectKind {
    /// 302 Found
    #[default]
    Temporary,
    /// 301 Moved Permanently
    Permanent,
}

impl RedirectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectKind::Temporary => "temporary",
            RedirectKind::Permanent => "permanent",
        }
    }
}

impl FromStr for RedirectKind {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "temporary" => Ok(RedirectKind::Temporary),
            "permanent" => Ok(RedirectKind::Permanent),
            other => Err(ParseFieldError {
                field: "redirect kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    #[default]
    Active,
    Paused,
    Archived,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Active => "active",
            LinkStatus::Paused => "paused",
            LinkStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LinkStatus::Active),
            "paused" => Ok(LinkStatus::Paused),
            "archived" => Ok(LinkStatus::Archived),
            other => Err(ParseFieldError {
                field: "link status",
                value: other.to_string(),
            }),
        }
    }
}

/// Coarse device classification used as the key of device routing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
        }
    }
}

/// Conditional destination overrides attached to a link.
///
/// Stored as JSON, e.g. `{"device":{"mobile":"https://m.example"},"geo":{"US":"https://us.example"}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub short_code: String,
    pub destination_url: String,
    pub title: Option<String>,
    pub redirect_kind: RedirectKind,
    pub rules: Option<RoutingRules>,
    pub status: LinkStatus,
    pub expires_at: Option<i64>,
    pub click_count: i64,
    pub last_click_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for link creation; the short code is optional and allocated when absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLink {
    pub destination_url: String,
    #[serde(default)]
    pub custom_code: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub redirect_kind: Option<String>,
    #[serde(default)]
    pub rules: Option<RoutingRules>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Immutable copy of the redirect-relevant fields of a link, as held in the link cache.
///
/// Refreshing an entry replaces the whole snapshot; it is never mutated in place.
#[derive(Debug, Clone)]
pub struct CachedLinkSnapshot {
    pub link_id: String,
    pub short_code: String,
    pub destination_url: String,
    pub rules: Option<Arc<RoutingRules>>,
    pub redirect_kind: RedirectKind,
    pub status: LinkStatus,
    pub cached_at: Instant,
}

impl CachedLinkSnapshot {
    pub fn from_link(link: &Link) -> Self {
        Self {
            link_id: link.id.clone(),
            short_code: link.short_code.clone(),
            destination_url: link.destination_url.clone(),
            rules: link.rules.clone().map(Arc::new),
            redirect_kind: link.redirect_kind,
            status: link.status,
            cached_at: Instant::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LinkStatus::Active
    }
}
