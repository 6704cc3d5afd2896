//! Named fragment generation on top of the fragment cache.
//!
//! Two kinds of fragment are generated from the snapshot:
//!
//! - `<Type>Fields`: `fragment ArticlePageFields on ArticlePage { … }`, one
//!   per content type, using the query builder's selection rules.
//! - `AllComponents`: a fragment on the content interface with one inline
//!   fragment per component type (names ending in `Block`, `Component` or
//!   `Element`, or implementing `_IComponent`).
//!
//! The generator keeps one [`FragmentCache`] per schema version. When the
//! introspector reports a new version, the previous instance directory is
//! removed and a new one is opened with a fresh `metadata.json`.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::fragment_cache::{CacheMetadata, FragmentCache};
use crate::introspector::SchemaIntrospector;
use crate::query_builder::{QueryBuilderOptions, SelectionRenderer};
use crate::schema::{SchemaSnapshot, CONTENT_INTERFACES};

pub const ALL_COMPONENTS: &str = "AllComponents";
const FIELDS_SUFFIX: &str = "Fields";
const COMPONENT_SUFFIXES: &[&str] = &["Block", "Component", "Element"];
const COMPONENT_INTERFACES: &[&str] = &["_IComponent", "IComponent"];

/// A fragment and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub name: String,
    pub content: String,
    pub cached: bool,
    pub instance_id: String,
}

pub struct FragmentGenerator {
    introspector: Arc<SchemaIntrospector>,
    cache_root: PathBuf,
    options: QueryBuilderOptions,
    cache: Mutex<Option<Arc<FragmentCache>>>,
}

impl FragmentGenerator {
    pub fn new(
        introspector: Arc<SchemaIntrospector>,
        cache_root: impl Into<PathBuf>,
        options: QueryBuilderOptions,
    ) -> Self {
        Self {
            introspector,
            cache_root: cache_root.into(),
            options,
            cache: Mutex::new(None),
        }
    }

    /// The cache for the current schema version.
    pub async fn cache(&self) -> Result<Arc<FragmentCache>> {
        let snapshot = self.introspector.initialize().await?;
        Ok(self.cache_for(&snapshot))
    }

    /// Names of every fragment the current schema can produce.
    pub async fn available(&self) -> Result<Vec<String>> {
        let snapshot = self.introspector.initialize().await?;
        Ok(fragment_names(&snapshot))
    }

    /// A fragment by name: cached if possible, generated otherwise.
    pub async fn get_fragment(&self, name: &str) -> Result<Fragment> {
        let snapshot = self.introspector.initialize().await?;
        let cache = self.cache_for(&snapshot);

        if let Some(content) = cache.get_cached_fragment(name) {
            return Ok(Fragment {
                name: name.to_string(),
                content,
                cached: true,
                instance_id: cache.instance_id().to_string(),
            });
        }

        let content = self.generate(&snapshot, name)?;
        cache.set_cached_fragment(name, &content, None);
        debug!(fragment = name, "Generated fragment");
        Ok(Fragment {
            name: name.to_string(),
            content,
            cached: false,
            instance_id: cache.instance_id().to_string(),
        })
    }

    /// Clear the current cache, memory and disk.
    pub fn invalidate(&self) -> Result<()> {
        let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cache) = guard.take() {
            cache.invalidate_cache()?;
        }
        Ok(())
    }

    /// Render a fragment without touching the cache.
    pub fn generate(&self, snapshot: &SchemaSnapshot, name: &str) -> Result<String> {
        let renderer = SelectionRenderer::new(snapshot, &self.options);

        if name == ALL_COMPONENTS {
            let Some(interface) = content_interface(snapshot) else {
                bail!("no content interface found on '{}'", snapshot.query_type_name());
            };
            let mut lines = vec![format!("fragment {} on {} {{", ALL_COMPONENTS, interface)];
            lines.push("  __typename".to_string());
            for component in component_types(snapshot) {
                if snapshot.implements(&component, &interface) {
                    renderer.push_inline_fragment(&component, 1, &mut lines);
                }
            }
            lines.push("}".to_string());
            return Ok(lines.join("\n"));
        }

        let type_name = name.strip_suffix(FIELDS_SUFFIX).unwrap_or_default();
        let Some(def) = snapshot
            .content_type(type_name)
            .and_then(|_| snapshot.get_type(type_name))
        else {
            bail!(
                "unknown fragment '{}'; available: {}",
                name,
                fragment_names(snapshot).join(", ")
            );
        };

        let mut lines = vec![format!("fragment {} on {} {{", name, type_name)];
        renderer.push_metadata(def, 1, &mut lines);
        renderer.push_type_body(type_name, 1, &mut lines);
        lines.push("}".to_string());
        Ok(lines.join("\n"))
    }

    fn cache_for(&self, snapshot: &SchemaSnapshot) -> Arc<FragmentCache> {
        let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cache) = guard.as_ref() {
            if cache.schema_version() == snapshot.schema_version() {
                return cache.clone();
            }
            info!(
                old = cache.schema_version(),
                new = snapshot.schema_version(),
                "Schema version changed; replacing fragment cache"
            );
            if let Err(e) = cache.invalidate_cache() {
                warn!(error = %e, "Failed to clear stale fragment cache");
            }
        }

        let cache = Arc::new(FragmentCache::new(
            &self.cache_root,
            self.introspector.client().endpoint(),
            snapshot.schema_version(),
        ));
        if cache.read_metadata().is_none() {
            if let Err(e) = cache.write_metadata(&metadata_for(snapshot, cache.endpoint())) {
                warn!(error = %e, "Failed to write fragment cache metadata");
            }
        }
        *guard = Some(cache.clone());
        cache
    }
}

/// The interface fragments are declared on: the content root's item type,
/// else the first content marker interface in the schema.
fn content_interface(snapshot: &SchemaSnapshot) -> Option<String> {
    if let Some(root) = snapshot.content_root() {
        return Some(root.item_type.clone());
    }
    CONTENT_INTERFACES
        .iter()
        .find(|i| snapshot.get_type(i).is_some())
        .map(|i| i.to_string())
}

/// Content types that are components.
pub fn component_types(snapshot: &SchemaSnapshot) -> Vec<String> {
    snapshot
        .content_types()
        .values()
        .filter(|ct| {
            COMPONENT_SUFFIXES.iter().any(|s| ct.name.ends_with(s))
                || ct
                    .interfaces
                    .iter()
                    .any(|i| COMPONENT_INTERFACES.contains(&i.as_str()))
        })
        .map(|ct| ct.name.clone())
        .collect()
}

/// `AllComponents` followed by `<Type>Fields` for every content type.
pub fn fragment_names(snapshot: &SchemaSnapshot) -> Vec<String> {
    std::iter::once(ALL_COMPONENTS.to_string())
        .chain(
            snapshot
                .content_type_names()
                .into_iter()
                .map(|t| format!("{}{}", t, FIELDS_SUFFIX)),
        )
        .collect()
}

fn metadata_for(snapshot: &SchemaSnapshot, endpoint: &str) -> CacheMetadata {
    CacheMetadata {
        schema_version: snapshot.schema_version().to_string(),
        endpoint: endpoint.to_string(),
        generated: Utc::now(),
        component_types: component_types(snapshot),
        fragment_count: snapshot.content_types().len() + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GraphClient;
    use crate::fixtures::{cms_schema, schema_without_content_root};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixtureClient;

    #[async_trait]
    impl GraphClient for FixtureClient {
        async fn query(&self, _document: &str, _variables: Option<Value>) -> Result<Value> {
            Ok(cms_schema())
        }

        fn endpoint(&self) -> &str {
            "https://cg.example.com/content/v2"
        }
    }

    fn generator(dir: &TempDir) -> FragmentGenerator {
        let introspector = Arc::new(SchemaIntrospector::new(Arc::new(FixtureClient)));
        FragmentGenerator::new(introspector, dir.path(), QueryBuilderOptions::default())
    }

    #[tokio::test]
    async fn test_all_components() {
        let dir = TempDir::new().unwrap();
        let fragment = generator(&dir).get_fragment(ALL_COMPONENTS).await.unwrap();
        assert!(!fragment.cached);
        assert!(fragment.content.starts_with("fragment AllComponents on _IContent {"));
        assert!(fragment.content.contains("  ... on HeroBlock {\n    Heading\n  }"));
        assert!(!fragment.content.contains("ArticlePage"));
    }

    #[tokio::test]
    async fn test_type_fields_fragment_is_cached() {
        let dir = TempDir::new().unwrap();
        let gen = generator(&dir);
        let first = gen.get_fragment("BlogPostFields").await.unwrap();
        assert!(first.content.starts_with("fragment BlogPostFields on BlogPost {\n  _metadata {"));
        assert!(first.content.contains("  Heading\n  Teaser\n}"));

        let second = gen.get_fragment("BlogPostFields").await.unwrap();
        assert!(second.cached);
        assert_eq!(first.content, second.content);
    }

    #[tokio::test]
    async fn test_unknown_fragment_lists_available() {
        let dir = TempDir::new().unwrap();
        let err = generator(&dir).get_fragment("PersonFields").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown fragment"));
        assert!(msg.contains("ArticlePageFields"));
    }

    #[tokio::test]
    async fn test_metadata_written_on_open() {
        let dir = TempDir::new().unwrap();
        let gen = generator(&dir);
        let cache = gen.cache().await.unwrap();
        let meta = cache.read_metadata().unwrap();
        assert_eq!(meta.component_types, vec!["HeroBlock"]);
        assert_eq!(meta.fragment_count, 5);
        assert!(cache.is_current());
    }

    #[tokio::test]
    async fn test_invalidate_removes_instance_dir() {
        let dir = TempDir::new().unwrap();
        let gen = generator(&dir);
        let fragment = gen.get_fragment(ALL_COMPONENTS).await.unwrap();
        let instance_dir = dir.path().join(&fragment.instance_id);
        assert!(instance_dir.exists());
        gen.invalidate().unwrap();
        assert!(!instance_dir.exists());
    }

    /// Serves `cms_schema` first and a different root afterwards.
    struct ChangingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GraphClient for ChangingClient {
        async fn query(&self, _document: &str, _variables: Option<Value>) -> Result<Value> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(cms_schema())
            } else {
                Ok(schema_without_content_root())
            }
        }

        fn endpoint(&self) -> &str {
            "https://cg.example.com/content/v2"
        }
    }

    #[tokio::test]
    async fn test_version_change_replaces_instance_dir() {
        let dir = TempDir::new().unwrap();
        let introspector = Arc::new(SchemaIntrospector::new(Arc::new(ChangingClient {
            calls: AtomicUsize::new(0),
        })));
        let gen = FragmentGenerator::new(introspector.clone(), dir.path(), QueryBuilderOptions::default());

        let old = gen.get_fragment("BlogPostFields").await.unwrap();
        let old_dir = dir.path().join(&old.instance_id);
        assert!(old_dir.join("BlogPostFields.graphql").exists());

        introspector.refresh().await.unwrap();
        let cache = gen.cache().await.unwrap();
        assert_ne!(cache.instance_id(), old.instance_id);
        assert!(!old_dir.exists());
        assert!(cache.is_current());
        assert_eq!(cache.read_metadata().unwrap().schema_version, cache.schema_version());
    }
}
