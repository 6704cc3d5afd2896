//! TTL cache for discovery results.
//!
//! Holds serialized discovery data at three granularities, each with its own
//! time-to-live:
//!
//! | Key | Default TTL |
//! |-----|-------------|
//! | content type list | 5 min |
//! | per-type fields / schema | 10 min |
//! | raw introspection marker | 1 h |
//!
//! Expired entries are evicted lazily on read.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::config::CacheConfig;

const TYPES_KEY: &str = "types";
const INTROSPECTION_KEY: &str = "introspection";

/// A cached discovery value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedData {
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub from_cache: bool,
}

/// Time-to-live settings.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryTtl {
    pub types: Duration,
    pub fields: Duration,
    pub introspection: Duration,
}

impl Default for DiscoveryTtl {
    fn default() -> Self {
        Self {
            types: Duration::from_secs(5 * 60),
            fields: Duration::from_secs(10 * 60),
            introspection: Duration::from_secs(60 * 60),
        }
    }
}

impl From<&CacheConfig> for DiscoveryTtl {
    fn from(cfg: &CacheConfig) -> Self {
        Self {
            types: Duration::from_secs(cfg.types_ttl_secs),
            fields: Duration::from_secs(cfg.fields_ttl_secs),
            introspection: Duration::from_secs(cfg.introspection_ttl_secs),
        }
    }
}

struct Entry {
    data: Value,
    stored_at: DateTime<Utc>,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now
            .signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or_default();
        age >= self.ttl
    }
}

/// In-memory discovery cache.
pub struct DiscoveryCache {
    ttl: DiscoveryTtl,
    entries: RwLock<HashMap<String, Entry>>,
}

impl DiscoveryCache {
    pub fn new(ttl: DiscoveryTtl) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> DiscoveryTtl {
        self.ttl
    }

    // ── Content type list ───────────────────────────────────────────

    pub fn get_types(&self) -> Option<CachedData> {
        self.get(TYPES_KEY)
    }

    pub fn cache_types(&self, data: Value) {
        self.put(TYPES_KEY.to_string(), data, self.ttl.types);
    }

    pub fn invalidate_types(&self) {
        self.remove(&[TYPES_KEY.to_string()]);
    }

    // ── Per-type fields ─────────────────────────────────────────────

    pub fn get_fields(&self, content_type: &str) -> Option<CachedData> {
        self.get(&fields_key(content_type))
    }

    pub fn cache_fields(&self, content_type: &str, data: Value) {
        self.put(fields_key(content_type), data, self.ttl.fields);
    }

    // ── Per-type schema ─────────────────────────────────────────────

    pub fn get_schema(&self, content_type: &str) -> Option<CachedData> {
        self.get(&schema_key(content_type))
    }

    pub fn cache_schema(&self, content_type: &str, data: Value) {
        self.put(schema_key(content_type), data, self.ttl.fields);
    }

    /// Drop the fields and schema entries of one content type.
    pub fn invalidate_type(&self, content_type: &str) {
        self.remove(&[fields_key(content_type), schema_key(content_type)]);
    }

    // ── Raw introspection ───────────────────────────────────────────

    pub fn get_introspection(&self) -> Option<CachedData> {
        self.get(INTROSPECTION_KEY)
    }

    pub fn cache_introspection(&self, data: Value) {
        self.put(INTROSPECTION_KEY.to_string(), data, self.ttl.introspection);
    }

    pub fn invalidate_introspection(&self) {
        self.remove(&[INTROSPECTION_KEY.to_string()]);
    }

    pub fn invalidate_all(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: &str) -> Option<CachedData> {
        let now = Utc::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    return Some(CachedData {
                        data: entry.data.clone(),
                        timestamp: entry.stored_at,
                        from_cache: true,
                    });
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.evict_expired(key)
    }

    /// Remove `key` if it is still expired under the write lock; an entry
    /// re-cached since the read is returned instead.
    fn evict_expired(&self, key: &str) -> Option<CachedData> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Utc::now()) => Some(CachedData {
                data: entry.data.clone(),
                timestamp: entry.stored_at,
                from_cache: true,
            }),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: String, data: Value, ttl: Duration) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).insert(
            key,
            Entry {
                data,
                stored_at: Utc::now(),
                ttl,
            },
        );
    }

    fn remove(&self, keys: &[String]) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            entries.remove(key);
        }
    }
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::new(DiscoveryTtl::default())
    }
}

fn fields_key(content_type: &str) -> String {
    format!("fields:{}", content_type)
}

fn schema_key(content_type: &str) -> String {
    format!("schema:{}", content_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_ttls() {
        let ttl = DiscoveryTtl::default();
        assert_eq!(ttl.types, Duration::from_secs(300));
        assert_eq!(ttl.fields, Duration::from_secs(600));
        assert_eq!(ttl.introspection, Duration::from_secs(3600));
        assert!(ttl.types < ttl.fields && ttl.fields < ttl.introspection);
    }

    #[test]
    fn test_types_roundtrip() {
        let cache = DiscoveryCache::default();
        assert!(cache.get_types().is_none());
        cache.cache_types(json!(["ArticlePage"]));
        let hit = cache.get_types().unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.data, json!(["ArticlePage"]));
    }

    #[test]
    fn test_invalidate_type_only_touches_that_type() {
        let cache = DiscoveryCache::default();
        cache.cache_fields("ArticlePage", json!([1]));
        cache.cache_schema("ArticlePage", json!({}));
        cache.cache_fields("BlogPost", json!([2]));
        cache.cache_types(json!([]));

        cache.invalidate_type("ArticlePage");
        assert!(cache.get_fields("ArticlePage").is_none());
        assert!(cache.get_schema("ArticlePage").is_none());
        assert!(cache.get_fields("BlogPost").is_some());
        assert!(cache.get_types().is_some());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = DiscoveryCache::new(DiscoveryTtl {
            types: Duration::ZERO,
            fields: Duration::from_secs(60),
            introspection: Duration::ZERO,
        });
        cache.cache_types(json!(["x"]));
        cache.cache_introspection(json!("v1"));
        cache.cache_fields("T", json!([]));
        assert!(cache.get_types().is_none());
        assert!(cache.get_introspection().is_none());
        assert!(cache.get_fields("T").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_all() {
        let cache = DiscoveryCache::default();
        cache.cache_types(json!([]));
        cache.cache_introspection(json!("v1"));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eviction_spares_recached_entry() {
        let cache = DiscoveryCache::default();
        cache.entries.write().unwrap().insert(
            TYPES_KEY.to_string(),
            Entry {
                data: json!(["stale"]),
                stored_at: Utc::now() - chrono::Duration::minutes(10),
                ttl: Duration::from_secs(60),
            },
        );
        assert!(cache.evict_expired(TYPES_KEY).is_none());
        assert!(cache.entries.read().unwrap().get(TYPES_KEY).is_none());

        cache.cache_types(json!(["fresh"]));
        let hit = cache.evict_expired(TYPES_KEY).unwrap();
        assert_eq!(hit.data, json!(["fresh"]));
        assert_eq!(cache.get_types().unwrap().data, json!(["fresh"]));
    }
}
