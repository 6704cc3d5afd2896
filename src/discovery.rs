//! Schema discovery with TTL caching.
//!
//! [`DiscoveryService::discover`] answers "what content exists" questions
//! for a target:
//!
//! | Target | Data |
//! |--------|------|
//! | `types` | content type summaries |
//! | `fields` | fields of one content type |
//! | `schema` | one content type with fields and interfaces |
//! | `all` | schema overview: version, content root, types, search/filter fields |
//!
//! Results pass through the [`DiscoveryCache`]. The cache also keeps an
//! introspection marker with the longest TTL; once it expires the snapshot
//! is refreshed and every derived entry is dropped.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::discovery_cache::{CachedData, DiscoveryCache, DiscoveryTtl};
use crate::introspector::{InitState, SchemaIntrospector};
use crate::schema::SchemaSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryTarget {
    Types,
    Fields,
    Schema,
    All,
}

impl FromStr for DiscoveryTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "types" => Ok(DiscoveryTarget::Types),
            "fields" => Ok(DiscoveryTarget::Fields),
            "schema" => Ok(DiscoveryTarget::Schema),
            "all" => Ok(DiscoveryTarget::All),
            other => bail!(
                "unknown discovery target '{}' (expected types, fields, schema or all)",
                other
            ),
        }
    }
}

impl fmt::Display for DiscoveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryTarget::Types => "types",
            DiscoveryTarget::Fields => "fields",
            DiscoveryTarget::Schema => "schema",
            DiscoveryTarget::All => "all",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryResult {
    pub target: DiscoveryTarget,
    pub data: Value,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
struct ContentTypeSummary<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    interfaces: &'a [String],
    field_count: usize,
}

pub struct DiscoveryService {
    introspector: Arc<SchemaIntrospector>,
    cache: DiscoveryCache,
    /// Set once an introspection marker has been stored. A missing marker
    /// only means "expired" after this.
    marker_seeded: AtomicBool,
}

impl DiscoveryService {
    pub fn new(introspector: Arc<SchemaIntrospector>, ttl: DiscoveryTtl) -> Self {
        Self {
            introspector,
            cache: DiscoveryCache::new(ttl),
            marker_seeded: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    pub async fn discover(
        &self,
        target: DiscoveryTarget,
        content_type: Option<&str>,
    ) -> Result<DiscoveryResult> {
        let content_type = content_type.map(str::trim).filter(|s| !s.is_empty());
        if matches!(target, DiscoveryTarget::Fields | DiscoveryTarget::Schema)
            && content_type.is_none()
        {
            bail!("content_type is required for target '{}'", target);
        }

        let snapshot = self.fresh_snapshot().await?;
        let (data, cached) = match (target, content_type) {
            (DiscoveryTarget::Types, _) => self.types(&snapshot),
            (DiscoveryTarget::Fields, Some(ct)) => self.fields(&snapshot, ct),
            (DiscoveryTarget::Schema, Some(ct)) => self.schema(&snapshot, ct),
            (DiscoveryTarget::All, _) => (
                CachedData {
                    data: overview(&snapshot),
                    timestamp: Utc::now(),
                    from_cache: false,
                },
                false,
            ),
            (_, None) => bail!("content_type is required for target '{}'", target),
        };

        Ok(DiscoveryResult {
            target,
            data: data.data,
            cached,
            timestamp: data.timestamp,
        })
    }

    /// Drop every cached discovery result.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
        self.marker_seeded.store(false, Ordering::SeqCst);
    }

    /// The current snapshot, refreshed when a stored introspection marker
    /// has expired.
    ///
    /// A snapshot another caller already fetched is adopted as-is: the first
    /// discovery only seeds the marker.
    async fn fresh_snapshot(&self) -> Result<Arc<SchemaSnapshot>> {
        if self.cache.get_introspection().is_some() {
            return self.introspector.initialize().await;
        }

        let expired = self.marker_seeded.load(Ordering::SeqCst)
            && self.introspector.state() == InitState::Ready;
        let snapshot = if expired {
            info!("Introspection cache expired; refreshing schema");
            self.cache.invalidate_all();
            self.introspector.refresh().await?
        } else {
            self.introspector.initialize().await?
        };
        self.cache.cache_introspection(json!({
            "schema_version": snapshot.schema_version(),
            "endpoint": self.introspector.client().endpoint(),
        }));
        self.marker_seeded.store(true, Ordering::SeqCst);
        Ok(snapshot)
    }

    fn types(&self, snapshot: &SchemaSnapshot) -> (CachedData, bool) {
        if let Some(hit) = self.cache.get_types() {
            debug!("Discovery cache hit: types");
            return (hit, true);
        }
        let summaries: Vec<ContentTypeSummary<'_>> = snapshot
            .content_types()
            .values()
            .map(|ct| ContentTypeSummary {
                name: &ct.name,
                description: ct.description.as_deref(),
                interfaces: &ct.interfaces,
                field_count: ct.fields.len(),
            })
            .collect();
        let data = json!(summaries);
        self.cache.cache_types(data.clone());
        (fresh(data), false)
    }

    fn fields(&self, snapshot: &SchemaSnapshot, content_type: &str) -> (CachedData, bool) {
        if let Some(hit) = self.cache.get_fields(content_type) {
            debug!(content_type, "Discovery cache hit: fields");
            return (hit, true);
        }
        let data = json!(snapshot.fields_for_type(content_type));
        self.cache.cache_fields(content_type, data.clone());
        (fresh(data), false)
    }

    fn schema(&self, snapshot: &SchemaSnapshot, content_type: &str) -> (CachedData, bool) {
        if let Some(hit) = self.cache.get_schema(content_type) {
            debug!(content_type, "Discovery cache hit: schema");
            return (hit, true);
        }
        let data = match snapshot.content_type(content_type) {
            Some(ct) => json!({
                "name": ct.name,
                "description": ct.description,
                "interfaces": ct.interfaces,
                "is_content_type": true,
                "fields": ct.fields.values().collect::<Vec<_>>(),
            }),
            None => json!({
                "name": content_type,
                "description": null,
                "interfaces": [],
                "is_content_type": false,
                "fields": snapshot.fields_for_type(content_type),
            }),
        };
        self.cache.cache_schema(content_type, data.clone());
        (fresh(data), false)
    }
}

fn fresh(data: Value) -> CachedData {
    CachedData {
        data,
        timestamp: Utc::now(),
        from_cache: false,
    }
}

fn overview(snapshot: &SchemaSnapshot) -> Value {
    json!({
        "schema_version": snapshot.schema_version(),
        "query_type": snapshot.query_type_name(),
        "content_root": snapshot.content_root(),
        "query_fields": snapshot.root_query_fields(),
        "content_types": snapshot.content_type_names(),
        "searchable_fields": snapshot.searchable_fields(),
        "filterable_fields": snapshot.filterable_fields(),
    })
}
