//! Country lookup for geo routing and click records.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

/// Resolves a client address to an ISO 3166-1 alpha-2 country code.
pub trait GeoResolver: Send + Sync {
    fn lookup_country(&self, ip: IpAddr) -> Option<String>;
}

/// Used when no GeoIP database is configured; geo rules never match.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGeoResolver;

impl GeoResolver for NoopGeoResolver {
    fn lookup_country(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// Memory-mapped MaxMind GeoLite2/GeoIP2 City or Country database.
#[derive(Clone)]
pub struct MaxMindGeoResolver {
    reader: Arc<Reader<Mmap>>,
}

impl MaxMindGeoResolver {
    pub fn open(path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(path) }
            .with_context(|| format!("Failed to open GeoIP database at {}", path))?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }
}

impl GeoResolver for MaxMindGeoResolver {
    fn lookup_country(&self, ip: IpAddr) -> Option<String> {
        // The City database is a superset of Country, so decoding Country works for both
        let result = self.reader.lookup(ip).ok()?;
        let country = result.decode::<geoip2::Country>().ok()??;
        country.country.iso_code.map(|s| s.to_string())
    }
}
