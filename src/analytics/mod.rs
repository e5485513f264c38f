//! Request context capture and visit recording
//!
//! Everything here runs on or next to the redirect hot path: client IP
//! extraction, GeoIP country lookup, user-agent classification and the
//! detached click recorder.

pub mod geoip;
pub mod ip_extractor;
pub mod recorder;
pub mod user_agent;

pub use geoip::{GeoResolver, MaxMindGeoResolver, NoopGeoResolver};
pub use ip_extractor::extract_client_ip;
pub use recorder::ClickRecorder;
pub use user_agent::{KeywordUserAgentParser, ParsedUserAgent, UserAgentParser};
