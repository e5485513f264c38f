use crate::models::DeviceClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUserAgent {
    pub os: String,
    pub browser: String,
    pub device: DeviceClass,
}

pub trait UserAgentParser: Send + Sync {
    fn parse(&self, user_agent: &str) -> ParsedUserAgent;
}

/// Substring classifier. Coarse, but enough for device routing.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordUserAgentParser;

impl UserAgentParser for KeywordUserAgentParser {
    fn parse(&self, user_agent: &str) -> ParsedUserAgent {
        let ua = user_agent.to_lowercase();
        ParsedUserAgent {
            os: detect_os(&ua).to_string(),
            browser: detect_browser(&ua).to_string(),
            device: detect_device(&ua),
        }
    }
}

fn detect_device(ua: &str) -> DeviceClass {
    if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        if ua.contains("ipad") || ua.contains("tablet") {
            return DeviceClass::Tablet;
        }
        return DeviceClass::Mobile;
    }
    DeviceClass::Desktop
}

// Android and iOS strings also mention Linux / Mac OS, so check them first
fn detect_os(ua: &str) -> &'static str {
    if ua.contains("android") {
        "Android"
    } else if ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

fn detect_browser(ua: &str) -> &'static str {
    if ua.contains("edg") {
        "Edge"
    } else if ua.contains("chrome") {
        "Chrome"
    } else if ua.contains("firefox") {
        "Firefox"
    } else if ua.contains("safari") {
        "Safari"
    } else {
        "Unknown"
    }
}
