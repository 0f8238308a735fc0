use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

/// In-process typed KV with per-key TTL, backing the cache half of the
/// Gateway. Ephemeral by design — nothing here survives a restart; durable
/// state lives in `store`.
#[derive(Default)]
pub struct TtlCache {
    map: DashMap<String, Entry>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    pub fn put(&self, key: impl Into<String>, bytes: Vec<u8>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.map.insert(key.into(), Entry { bytes, expires_at });
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.map.get(key) {
            Some(entry) => matches!(entry.expires_at, Some(exp) if Instant::now() >= exp),
            None => return None,
        };
        if expired {
            self.map.remove(key);
            return None;
        }
        self.map.get(key).map(|e| e.bytes.clone())
    }

    pub fn del(&self, key: &str) {
        self.map.remove(key);
    }

    pub fn put_json<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> serde_json::Result<()> {
        self.put(key, serde_json::to_vec(value)?, ttl);
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|b| serde_json::from_slice(&b).ok())
    }

    /// Startup sweep: drop every entry `keep` rejects, returning the purged
    /// keys so the caller can log them.
    pub fn retain(&self, mut keep: impl FnMut(&str, &[u8]) -> bool) -> Vec<String> {
        let mut purged = Vec::new();
        self.map.retain(|k, v| {
            let ok = keep(k, &v.bytes);
            if !ok {
                purged.push(k.clone());
            }
            ok
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Cache key namespace, matching the prefixes enumerated for the Gateway.
pub mod keys {
    pub fn factor_latest(factor_id: &str) -> String {
        format!("factor:{factor_id}:latest")
    }

    pub fn price(version: u32, symbol: &str, bars: u32, adj: &str) -> String {
        format!("price:v{version}:{symbol}:{bars}:{adj}")
    }

    pub fn cta_zone(symbol: &str) -> String {
        format!("cta:zone:{symbol}")
    }

    pub const BIAS_COMPOSITE_LATEST: &str = "bias:composite:latest";
    pub const BREAKER_STATE: &str = "breaker:state";

    pub fn uw_flow(symbol: &str) -> String {
        format!("uw:flow:{symbol}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn put_get_roundtrip() {
        let cache = TtlCache::new();
        cache.put("a", b"hello".to_vec(), None);
        assert_eq!(cache.get("a"), Some(b"hello".to_vec()));
    }

    #[test]
    fn expires_after_ttl() {
        let cache = TtlCache::new();
        cache.put("a", b"hello".to_vec(), Some(Duration::from_millis(10)));
        sleep(Duration::from_millis(30));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn del_removes_entry() {
        let cache = TtlCache::new();
        cache.put("a", b"hello".to_vec(), None);
        cache.del("a");
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn retain_purges_rejected_entries() {
        let cache = TtlCache::new();
        cache.put("keep", b"1".to_vec(), None);
        cache.put("drop", b"2".to_vec(), None);
        let purged = cache.retain(|k, _| k == "keep");
        assert_eq!(purged, vec!["drop".to_string()]);
        assert!(cache.get("keep").is_some());
        assert!(cache.get("drop").is_none());
    }
}
