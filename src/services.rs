//! Composition root.
//!
//! [`CmsServices`] constructs and owns every service for one CMS endpoint:
//! the GraphQL client, the introspector, discovery, the query builder, the
//! fragment generator and the field mapper. Each service holds an `Arc` to
//! the shared introspector; nothing is global.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::client::{GraphClient, HttpGraphClient};
use crate::config::Config;
use crate::discovery::DiscoveryService;
use crate::discovery_cache::DiscoveryTtl;
use crate::field_mapper::FieldMapper;
use crate::fragments::FragmentGenerator;
use crate::introspector::SchemaIntrospector;
use crate::query_builder::{BuiltQuery, DynamicQueryBuilder, QueryBuilderOptions};
use crate::type_matcher::{candidates_from_snapshot, match_content_type, TypeMatchResult};

pub struct CmsServices {
    config: Arc<Config>,
    client: Arc<dyn GraphClient>,
    introspector: Arc<SchemaIntrospector>,
    discovery: DiscoveryService,
    builder: DynamicQueryBuilder,
    fragments: FragmentGenerator,
    field_mapper: FieldMapper,
}

impl CmsServices {
    /// Wire every service around `client`.
    pub fn new(config: Config, client: Arc<dyn GraphClient>) -> Self {
        let introspector = Arc::new(SchemaIntrospector::new(client.clone()));
        let options = QueryBuilderOptions::from(&config.query);
        Self {
            discovery: DiscoveryService::new(introspector.clone(), DiscoveryTtl::from(&config.cache)),
            builder: DynamicQueryBuilder::new(introspector.clone(), options.clone()),
            fragments: FragmentGenerator::new(introspector.clone(), config.cache.dir.clone(), options),
            field_mapper: FieldMapper::new(introspector.clone()),
            config: Arc::new(config),
            client,
            introspector,
        }
    }

    /// Services talking to the configured endpoint over HTTP.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = HttpGraphClient::new(&config.graph)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    pub fn introspector(&self) -> &Arc<SchemaIntrospector> {
        &self.introspector
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    pub fn builder(&self) -> &DynamicQueryBuilder {
        &self.builder
    }

    pub fn fragments(&self) -> &FragmentGenerator {
        &self.fragments
    }

    pub fn field_mapper(&self) -> &FieldMapper {
        &self.field_mapper
    }

    /// Run a built query; the response JSON is returned as-is.
    pub async fn execute(&self, built: &BuiltQuery) -> Result<Value> {
        self.client
            .query(&built.query, Some(Value::Object(built.variables.clone())))
            .await
    }

    /// Rank the current content types against `hint`.
    pub async fn match_content_type(
        &self,
        hint: &str,
        context: Option<&str>,
    ) -> Result<TypeMatchResult> {
        let snapshot = self.introspector.initialize().await?;
        Ok(match_content_type(
            hint,
            context,
            &candidates_from_snapshot(&snapshot),
        ))
    }

    /// Drop the discovery cache, the fragment cache and the snapshot.
    pub async fn invalidate_all(&self) -> Result<()> {
        self.discovery.invalidate();
        self.fragments.invalidate()?;
        self.introspector.invalidate().await;
        info!(endpoint = self.client.endpoint(), "Caches invalidated");
        Ok(())
    }
}
