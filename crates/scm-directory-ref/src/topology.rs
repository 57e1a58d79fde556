use std::collections::HashMap;
use std::sync::RwLock;

use tracing::warn;

/// §4.4: "topology resolution failures fall back to a default rack
/// string."
pub const DEFAULT_RACK: &str = "/default-rack";

/// Pluggable capability resolving a node's topology location from its
/// hostname/IP (§4.4 `register`, §9 "dynamic dispatch" note).
pub trait DnsToSwitchResolver: Send + Sync {
    fn resolve(&self, hostname: &str, ip_address: &str) -> Option<String>;
}

/// A resolver backed by a fixed hostname/IP -> rack table, standing in for
/// whatever real topology script or rack-awareness service a deployment
/// plugs in. Falls back to [`DEFAULT_RACK`] for anything not in the table.
#[derive(Debug, Default)]
pub struct StaticDnsToSwitchResolver {
    by_hostname: HashMap<String, String>,
    by_ip: HashMap<String, String>,
}

impl StaticDnsToSwitchResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hostname_mapping(mut self, hostname: impl Into<String>, rack: impl Into<String>) -> Self {
        self.by_hostname.insert(hostname.into(), rack.into());
        self
    }

    pub fn with_ip_mapping(mut self, ip: impl Into<String>, rack: impl Into<String>) -> Self {
        self.by_ip.insert(ip.into(), rack.into());
        self
    }
}

impl DnsToSwitchResolver for StaticDnsToSwitchResolver {
    fn resolve(&self, hostname: &str, ip_address: &str) -> Option<String> {
        self.by_hostname
            .get(hostname)
            .or_else(|| self.by_ip.get(ip_address))
            .cloned()
    }
}

/// Wraps any resolver with a cache keyed on (hostname, ip) — §4.4
/// explicitly calls the resolver "pluggable (cached)", since a real
/// topology script is typically a subprocess call too expensive to run on
/// every registration.
pub struct CachedDnsToSwitchResolver<R> {
    inner: R,
    cache: RwLock<HashMap<(String, String), String>>,
}

impl<R: DnsToSwitchResolver> CachedDnsToSwitchResolver<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, cache: RwLock::new(HashMap::new()) }
    }

    /// Resolves, falling back to [`DEFAULT_RACK`] and logging a warning
    /// when the underlying resolver cannot place the node (§4.4).
    pub fn resolve_or_default(&self, hostname: &str, ip_address: &str) -> String {
        let key = (hostname.to_string(), ip_address.to_string());
        if let Some(cached) = self.cache.read().expect("resolver cache lock poisoned").get(&key) {
            return cached.clone();
        }

        let resolved = self.inner.resolve(hostname, ip_address).unwrap_or_else(|| {
            warn!(hostname, ip_address, "topology resolution failed, using default rack");
            DEFAULT_RACK.to_string()
        });

        self.cache
            .write()
            .expect("resolver cache lock poisoned")
            .insert(key, resolved.clone());
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_from_the_static_table() {
        let resolver = StaticDnsToSwitchResolver::new().with_hostname_mapping("dn1", "/rack-1");
        let cached = CachedDnsToSwitchResolver::new(resolver);
        assert_eq!(cached.resolve_or_default("dn1", "10.0.0.1"), "/rack-1");
    }

    #[test]
    fn falls_back_to_default_rack_on_unresolved_hosts() {
        let resolver = StaticDnsToSwitchResolver::new();
        let cached = CachedDnsToSwitchResolver::new(resolver);
        assert_eq!(cached.resolve_or_default("unknown", "10.0.0.9"), DEFAULT_RACK);
    }

    #[test]
    fn caches_repeat_lookups() {
        let resolver = StaticDnsToSwitchResolver::new().with_hostname_mapping("dn1", "/rack-1");
        let cached = CachedDnsToSwitchResolver::new(resolver);
        assert_eq!(cached.resolve_or_default("dn1", "10.0.0.1"), "/rack-1");
        // Second call must hit the cache, not the (stubbed-out) resolver.
        assert_eq!(cached.resolve_or_default("dn1", "10.0.0.1"), "/rack-1");
    }
}
