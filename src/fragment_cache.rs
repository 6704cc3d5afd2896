//! Two-tier fragment cache (memory → disk) partitioned per CMS instance.
//!
//! Every cache is bound to one `(endpoint, schema_version)` pair. Its on-disk
//! state lives under `<root>/<instance_id>/` where `instance_id` is a
//! truncated SHA-256 of `endpoint + schema_version`, so two CMS instances (or
//! one instance before and after a schema change) never share files.
//!
//! ```text
//! <root>/
//! └── 3f9a1c0d2b7e/
//!     ├── metadata.json
//!     ├── AllComponents.graphql
//!     └── ArticlePageFields.graphql
//! ```
//!
//! Disk writes are best-effort: [`FragmentCache::write_to_disk`] returns a
//! `Result`, and [`FragmentCache::set_cached_fragment`] logs its error and
//! keeps the in-memory entry. Concurrent processes writing the same
//! directory may race; the content is regenerable from the schema.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};
use tracing::{debug, warn};

const METADATA_FILE: &str = "metadata.json";
const FRAGMENT_EXT: &str = "graphql";

/// A cached fragment held in memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Fragment document text.
    pub content: String,
    /// When the entry entered memory (set or promoted from disk).
    pub cached_at: DateTime<Utc>,
    /// Memory hits since then; a disk promotion counts as one.
    pub hit_count: u64,
}

/// Sidecar describing what an instance directory holds.
///
/// Stored as `metadata.json` with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Schema version the fragments were generated from.
    pub schema_version: String,
    /// GraphQL endpoint the schema came from.
    pub endpoint: String,
    /// When the instance was opened.
    pub generated: DateTime<Utc>,
    /// Types covered by `AllComponents`.
    pub component_types: Vec<String>,
    /// Fragments the schema can produce: one per content type plus
    /// `AllComponents`.
    pub fragment_count: usize,
}

/// Memory + disk fragment cache for one CMS instance and schema version.
pub struct FragmentCache {
    root: PathBuf,
    endpoint: String,
    schema_version: String,
    instance_id: OnceLock<String>,
    memory: RwLock<HashMap<String, CacheEntry>>,
}

impl FragmentCache {
    pub fn new(
        root: impl Into<PathBuf>,
        endpoint: impl Into<String>,
        schema_version: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            endpoint: endpoint.into(),
            schema_version: schema_version.into(),
            instance_id: OnceLock::new(),
            memory: RwLock::new(HashMap::new()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Truncated hash of `endpoint + schema_version`, computed once.
    pub fn instance_id(&self) -> &str {
        self.instance_id
            .get_or_init(|| instance_id_for(&self.endpoint, &self.schema_version))
    }

    /// Directory holding this instance's files.
    pub fn instance_dir(&self) -> PathBuf {
        self.root.join(self.instance_id())
    }

    /// Look up a fragment: memory first, then disk.
    ///
    /// Disk hits are promoted into memory. A miss is `None`, never an error.
    pub fn get_cached_fragment(&self, name: &str) -> Option<String> {
        {
            let mut memory = self.memory.write().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = memory.get_mut(name) {
                entry.hit_count += 1;
                debug!(fragment = name, "Fragment cache hit (memory)");
                return Some(entry.content.clone());
            }
        }

        let path = self.fragment_path(name)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                debug!(fragment = name, "Fragment cache hit (disk)");
                let mut memory = self.memory.write().unwrap_or_else(|e| e.into_inner());
                memory.insert(
                    name.to_string(),
                    CacheEntry {
                        content: content.clone(),
                        cached_at: Utc::now(),
                        hit_count: 1,
                    },
                );
                Some(content)
            }
            Err(_) => {
                debug!(fragment = name, "Fragment cache miss");
                None
            }
        }
    }

    /// Store a fragment in memory and on disk.
    ///
    /// When `metadata` is given the sidecar is rewritten too. Disk failures
    /// are logged and otherwise ignored.
    pub fn set_cached_fragment(&self, name: &str, content: &str, metadata: Option<&CacheMetadata>) {
        {
            let mut memory = self.memory.write().unwrap_or_else(|e| e.into_inner());
            memory.insert(
                name.to_string(),
                CacheEntry {
                    content: content.to_string(),
                    cached_at: Utc::now(),
                    hit_count: 0,
                },
            );
        }

        if let Err(e) = self.write_to_disk(name, content, metadata) {
            warn!(fragment = name, error = %e, "Failed to persist fragment cache entry");
        }
    }

    /// Write a fragment (and optionally the metadata sidecar) to disk.
    pub fn write_to_disk(
        &self,
        name: &str,
        content: &str,
        metadata: Option<&CacheMetadata>,
    ) -> Result<()> {
        let path = self
            .fragment_path(name)
            .ok_or_else(|| anyhow::anyhow!("invalid fragment name: '{}'", name))?;
        let dir = self.instance_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache dir: {}", dir.display()))?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write fragment: {}", path.display()))?;
        if let Some(meta) = metadata {
            self.write_metadata(meta)?;
        }
        Ok(())
    }

    /// Read the metadata sidecar, if present and parseable.
    pub fn read_metadata(&self) -> Option<CacheMetadata> {
        let path = self.instance_dir().join(METADATA_FILE);
        let text = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cache metadata");
                None
            }
        }
    }

    pub fn write_metadata(&self, metadata: &CacheMetadata) -> Result<()> {
        let dir = self.instance_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache dir: {}", dir.display()))?;
        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write metadata: {}", path.display()))?;
        Ok(())
    }

    /// Whether the stored sidecar was written for this schema version.
    ///
    /// A missing sidecar counts as stale.
    pub fn is_current(&self) -> bool {
        self.read_metadata()
            .map(|m| m.schema_version == self.schema_version)
            .unwrap_or(false)
    }

    /// Clear memory and delete the instance directory.
    ///
    /// Safe when nothing has been cached yet.
    pub fn invalidate_cache(&self) -> Result<()> {
        self.memory
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let dir = self.instance_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove cache dir: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Snapshot of the in-memory tier, keyed by fragment name.
    pub fn memory_entries(&self) -> HashMap<String, CacheEntry> {
        self.memory
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn fragment_path(&self, name: &str) -> Option<PathBuf> {
        if !is_valid_fragment_name(name) {
            return None;
        }
        Some(
            self.instance_dir()
                .join(format!("{}.{}", name, FRAGMENT_EXT)),
        )
    }
}

/// Truncated SHA-256 of `endpoint + schema_version`.
pub fn instance_id_for(endpoint: &str, schema_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update(schema_version.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

/// Fragment names become file names; keep them to `[A-Za-z0-9_-]`.
fn is_valid_fragment_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Remove every instance directory under `root`; returns how many.
///
/// A missing root counts as empty.
pub fn clear_root(root: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read cache dir: {}", root.display()))
        }
    };
    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove cache dir: {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
