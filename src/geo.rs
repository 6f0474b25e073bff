use std::cell::RefCell;
use std::net::IpAddr;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use maxminddb::geoip2;
use maxminddb::Mmap;
use rustc_hash::FxHashMap;

/// Rendered in place of a field the lookup could not provide.
pub const PLACEHOLDER: &str = "-";

const CITY_DB_FILENAME: &str = "GeoLite2-City.mmdb";

// Searched in order when no database directory is given.
const DEFAULT_MMDB_PATHS: [&str; 3] = ["/usr/share/GeoIP", "/opt/homebrew/var/GeoIP", "/var/lib/GeoIP"];

/// Where an address appears to come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Demographics {
    pub country: String,
    pub city: String,
}

impl Default for Demographics {
    fn default() -> Self {
        Self {
            country: PLACEHOLDER.to_string(),
            city: PLACEHOLDER.to_string(),
        }
    }
}

/// Origin lookup for addresses. Lookups never fail: unknown fields come back
/// as [`PLACEHOLDER`].
pub trait GeoLookup {
    fn lookup(&self, ip: IpAddr) -> Demographics;
}

/// A lookup that knows nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderLookup;

impl GeoLookup for PlaceholderLookup {
    fn lookup(&self, _ip: IpAddr) -> Demographics {
        Demographics::default()
    }
}

/// Lookup backed by a MaxMind GeoLite2/GeoIP2 City database.
pub struct MaxMindLookup {
    reader: maxminddb::Reader<Mmap>,
    cache: RefCell<FxHashMap<IpAddr, Demographics>>,
}

impl MaxMindLookup {
    /// Open the City database in `dir`, or in the first standard GeoIP
    /// directory that exists.
    pub fn open(dir: Option<&Utf8Path>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => default_mmdb_dir(),
        };
        let path = dir.join(CITY_DB_FILENAME);
        let reader = maxminddb::Reader::open_mmap(&path)
            .with_context(|| format!("Failed to open City database at {}", path))?;
        tracing::debug!(path = %path, "opened geo database");
        Ok(Self {
            reader,
            cache: RefCell::new(FxHashMap::with_capacity_and_hasher(1024, Default::default())),
        })
    }

    fn resolve(&self, ip: IpAddr) -> Demographics {
        let record = match self.reader.lookup::<geoip2::City>(ip) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(%ip, error = %err, "geo lookup failed");
                return Demographics::default();
            }
        };
        let country = record
            .country
            .and_then(|c| c.names)
            .and_then(|names| names.get("en").map(|s| s.to_string()));
        let city = record
            .city
            .and_then(|c| c.names)
            .and_then(|names| names.get("en").map(|s| s.to_string()));
        Demographics {
            country: country.unwrap_or_else(|| PLACEHOLDER.to_string()),
            city: city.unwrap_or_else(|| PLACEHOLDER.to_string()),
        }
    }
}

impl GeoLookup for MaxMindLookup {
    fn lookup(&self, ip: IpAddr) -> Demographics {
        if let Some(cached) = self.cache.borrow().get(&ip) {
            return cached.clone();
        }
        let found = self.resolve(ip);
        self.cache.borrow_mut().insert(ip, found.clone());
        found
    }
}

fn default_mmdb_dir() -> Utf8PathBuf {
    DEFAULT_MMDB_PATHS
        .iter()
        .map(Utf8PathBuf::from)
        .find(|p| p.exists())
        .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_MMDB_PATHS[0]))
}
