use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: String,
    pub city: Option<String>,
}

/// Resolves a client address to a location.
#[async_trait::async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Option<GeoLocation>;
}

/// Never resolves anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGeoLookup;

#[async_trait::async_trait]
impl GeoLookup for NoGeoLookup {
    async fn lookup(&self, _ip: IpAddr) -> Option<GeoLocation> {
        None
    }
}

/// Fixed address table, loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticGeoLookup {
    table: HashMap<IpAddr, GeoLocation>,
}

impl StaticGeoLookup {
    pub fn new(table: HashMap<IpAddr, GeoLocation>) -> Self {
        Self { table }
    }
}

#[async_trait::async_trait]
impl GeoLookup for StaticGeoLookup {
    async fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        self.table.get(&ip).cloned()
    }
}
