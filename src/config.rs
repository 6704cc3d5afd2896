//! TOML configuration.
//!
//! ```toml
//! [graph]
//! endpoint = "https://cg.example.com/content/v2"
//! single_key = "..."        # or CMS_GRAPH_SINGLE_KEY
//!
//! [cache]
//! dir = "./.cache/cms-graph-mcp"
//!
//! [query]
//! max_depth = 2
//! max_depth_limit = 5
//!
//! [server]
//! bind = "127.0.0.1:7332"
//! ```
//!
//! Only `[graph].endpoint` is required. Credentials may come from the
//! environment so that config files can be committed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Hard ceiling for `query.max_depth_limit`.
pub const MAX_DEPTH_CEILING: usize = 8;

/// Environment variable overriding `graph.single_key`.
pub const SINGLE_KEY_ENV: &str = "CMS_GRAPH_SINGLE_KEY";
/// Environment variable overriding `graph.app_key`.
pub const APP_KEY_ENV: &str = "CMS_GRAPH_APP_KEY";
/// Environment variable overriding `graph.secret`.
pub const SECRET_ENV: &str = "CMS_GRAPH_SECRET";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub graph: GraphConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    pub endpoint: String,
    #[serde(default)]
    pub single_key: Option<String>,
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    1000
}

impl GraphConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            single_key: None,
            app_key: None,
            secret: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }

    /// Fill credentials from the environment where the file left them unset.
    pub fn apply_env(&mut self) {
        if self.single_key.is_none() {
            self.single_key = std::env::var(SINGLE_KEY_ENV).ok().filter(|v| !v.is_empty());
        }
        if self.app_key.is_none() {
            self.app_key = std::env::var(APP_KEY_ENV).ok().filter(|v| !v.is_empty());
        }
        if self.secret.is_none() {
            self.secret = std::env::var(SECRET_ENV).ok().filter(|v| !v.is_empty());
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_types_ttl")]
    pub types_ttl_secs: u64,
    #[serde(default = "default_fields_ttl")]
    pub fields_ttl_secs: u64,
    #[serde(default = "default_introspection_ttl")]
    pub introspection_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            types_ttl_secs: default_types_ttl(),
            fields_ttl_secs: default_fields_ttl(),
            introspection_ttl_secs: default_introspection_ttl(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./.cache/cms-graph-mcp")
}
fn default_types_ttl() -> u64 {
    300
}
fn default_fields_ttl() -> u64 {
    600
}
fn default_introspection_ttl() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Default nesting depth for object fields.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Largest `max_depth` a tool call may ask for.
    #[serde(default = "default_max_depth_limit")]
    pub max_depth_limit: usize,
    /// Select the `_metadata` block on content items.
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_depth_limit: default_max_depth_limit(),
            include_metadata: default_include_metadata(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_max_depth() -> usize {
    2
}
fn default_max_depth_limit() -> usize {
    5
}
fn default_include_metadata() -> bool {
    true
}
fn default_limit() -> u32 {
    20
}
fn default_max_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7332".to_string()
}

impl Config {
    /// A config pointing at `endpoint` with every other setting defaulted.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            graph: GraphConfig::new(endpoint),
            cache: CacheConfig::default(),
            query: QueryConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = self.graph.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            anyhow::bail!(
                "graph.endpoint must be an http(s) URL, got '{}'",
                self.graph.endpoint
            );
        }

        if self.query.max_depth_limit == 0 || self.query.max_depth_limit > MAX_DEPTH_CEILING {
            anyhow::bail!("query.max_depth_limit must be in [1, {}]", MAX_DEPTH_CEILING);
        }

        if self.query.max_depth == 0 || self.query.max_depth > self.query.max_depth_limit {
            anyhow::bail!(
                "query.max_depth must be in [1, query.max_depth_limit ({})]",
                self.query.max_depth_limit
            );
        }

        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            anyhow::bail!(
                "query.default_limit must be in [1, query.max_limit ({})]",
                self.query.max_limit
            );
        }

        if self.graph.app_key.is_some() != self.graph.secret.is_some() {
            anyhow::bail!("graph.app_key and graph.secret must be set together");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate config text, then apply environment credentials.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.graph.apply_env();
    config.validate()?;

    Ok(config)
}
