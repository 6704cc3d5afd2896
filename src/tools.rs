//! Tool trait, registry and the built-in CMS tools.
//!
//! Every operation the server exposes is a [`Tool`]: a name, a
//! description, a JSON Schema for its parameters and an async `execute`.
//! The HTTP API (`POST /tools/{name}`) and the MCP bridge dispatch through
//! the same [`ToolRegistry`], validating parameters with
//! [`validate_params`] first.
//!
//! # Built-in tools
//!
//! | Tool | Description |
//! |------|-------------|
//! | `discover_schema` | Content types, fields, per-type schema or an overview |
//! | `search_content` | Free-text / filtered search |
//! | `get_content` | One item by id (key, GUID or numeric id) |
//! | `get_content_by_path` | One item by URL path |
//! | `faceted_search` | Search with facet counts |
//! | `related_content` | Items sharing terms with a source item |
//! | `map_fields` | Map informal property names onto schema fields |
//! | `match_content_type` | Rank content types against a hint |
//! | `get_fragment` | Generated GraphQL fragment text |
//! | `invalidate_cache` | Drop cached schema, discovery and fragments |
//!
//! Query tools execute their document and return the raw GraphQL response
//! unless called with `"execute": false`, in which case they return the
//! `{query, variables}` pair.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::MAX_DEPTH_CEILING;
use crate::discovery::DiscoveryTarget;
use crate::fragment_cache::clear_root;
use crate::query_builder::{
    BuiltQuery, DynamicQueryBuilder, FacetedSearchParams, GetByIdParams, GetByPathParams,
    RelatedContentParams, SearchParams,
};
use crate::services::CmsServices;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// An operation agents can discover and call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name (`POST /tools/{name}`) and MCP tool name.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// JSON Schema with `type: "object"`, `properties` and optionally
    /// `required`.
    fn parameters_schema(&self) -> Value;

    /// Run the tool with validated parameters (always a JSON object).
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Serializable tool info for the `/tools/list` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Access to the CMS services during tool execution.
#[derive(Clone)]
pub struct ToolContext {
    services: Arc<CmsServices>,
}

impl ToolContext {
    pub fn new(services: Arc<CmsServices>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &CmsServices {
        &self.services
    }

    /// The default builder with per-call selection overrides
    /// (`max_depth`, `include_fields`, `exclude_fields`) applied.
    ///
    /// `max_depth` must not exceed the configured `max_depth_limit`.
    fn builder_for(&self, params: &Value) -> Result<DynamicQueryBuilder> {
        let base = self.services.builder();
        let mut options = base.options().clone();
        if let Some(depth) = params.get("max_depth").and_then(Value::as_u64) {
            let limit = options.max_depth_limit;
            if depth == 0 || depth > limit as u64 {
                bail!(
                    "invalid parameter 'max_depth': must be between 1 and {}, got {}",
                    limit,
                    depth
                );
            }
            options.max_depth = depth as usize;
        }
        if let Some(fields) = string_list(params.get("include_fields")) {
            options.include_fields = Some(fields);
        }
        if let Some(fields) = string_list(params.get("exclude_fields")) {
            options.exclude_fields = Some(fields);
        }
        Ok(base.with_options(options))
    }

    /// Execute `built` unless the caller asked for the document only.
    async fn run(&self, built: BuiltQuery, params: &Value) -> Result<Value> {
        let execute = params.get("execute").and_then(Value::as_bool).unwrap_or(true);
        if !execute {
            return Ok(serde_json::to_value(&built)?);
        }
        self.services.execute(&built).await
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

fn parse<T: DeserializeOwned>(params: &Value) -> Result<T> {
    serde_json::from_value(params.clone()).map_err(|e| anyhow!("invalid parameters: {}", e))
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter validation
// ═══════════════════════════════════════════════════════════════════════

/// Check `params` against a tool's JSON Schema.
///
/// Enforces `required`, primitive `type`s, `enum`s and integer
/// `minimum`/`maximum`, and fills in `default`s for absent properties.
/// Unknown properties pass through.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let empty = Map::new();
    let params_obj = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => bail!("invalid parameters: expected an object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            bail!("missing required parameter: {}", field);
        }
    }

    let mut result = params_obj.clone();
    for (name, prop) in &properties {
        let Some(value) = params_obj.get(name) else {
            if let Some(default) = prop.get("default") {
                result.insert(name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected) = prop.get("type").and_then(|t| t.as_str()) {
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !ok {
                bail!(
                    "invalid parameter '{}': expected {}, got {}",
                    name,
                    expected,
                    json_type_name(value)
                );
            }
        }

        if let Some(n) = value.as_i64() {
            let min = prop.get("minimum").and_then(Value::as_i64);
            let max = prop.get("maximum").and_then(Value::as_i64);
            if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                bail!(
                    "invalid parameter '{}': must be between {} and {}, got {}",
                    name,
                    min.map_or("-inf".to_string(), |v| v.to_string()),
                    max.map_or("inf".to_string(), |v| v.to_string()),
                    n
                );
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(value) {
                let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                bail!(
                    "invalid parameter '{}': must be one of [{}], got {}",
                    name,
                    allowed.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Shared schema fragments ─────────────────────────────────────────

fn selection_properties() -> Map<String, Value> {
    let props = json!({
        "content_types": {
            "type": "array", "items": { "type": "string" },
            "description": "Content types to return fields for; fuzzy names are resolved"
        },
        "locale": { "type": "string", "description": "Locale code, e.g. \"en\"" },
        "max_depth": {
            "type": "integer", "minimum": 1, "maximum": MAX_DEPTH_CEILING,
            "description": "Nesting depth for object fields"
        },
        "include_fields": {
            "type": "array", "items": { "type": "string" },
            "description": "Only select these top-level fields"
        },
        "exclude_fields": {
            "type": "array", "items": { "type": "string" },
            "description": "Never select these top-level fields"
        },
        "execute": {
            "type": "boolean", "default": true,
            "description": "Run the query (true) or return {query, variables} (false)"
        }
    });
    match props {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn search_properties() -> Map<String, Value> {
    let mut props = selection_properties();
    props.insert(
        "search_term".into(),
        json!({ "type": "string", "description": "Free text matched against searchable fields" }),
    );
    props.insert(
        "filters".into(),
        json!({
            "type": "object",
            "description": "Field filters: scalar → eq, array → in, object → operator object"
        }),
    );
    props.insert("limit".into(), json!({ "type": "integer", "description": "Max items" }));
    props.insert("skip".into(), json!({ "type": "integer", "description": "Items to skip" }));
    props
}

fn object_schema(properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tools
// ═══════════════════════════════════════════════════════════════════════

pub struct DiscoverSchemaTool;

#[async_trait]
impl Tool for DiscoverSchemaTool {
    fn name(&self) -> &str {
        "discover_schema"
    }

    fn description(&self) -> &str {
        "Discover content types, their fields, or a schema overview"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "enum": ["types", "fields", "schema", "all"],
                    "default": "types"
                },
                "content_type": {
                    "type": "string",
                    "description": "Required for fields and schema"
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let target: DiscoveryTarget = params["target"].as_str().unwrap_or("types").parse()?;
        let result = ctx
            .services()
            .discovery()
            .discover(target, params["content_type"].as_str())
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

pub struct SearchContentTool;

#[async_trait]
impl Tool for SearchContentTool {
    fn name(&self) -> &str {
        "search_content"
    }

    fn description(&self) -> &str {
        "Search content by free text, content type, locale and field filters"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(search_properties(), &[])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: SearchParams = parse(&params)?;
        let built = ctx.builder_for(&params)?.build_search(&request).await?;
        ctx.run(built, &params).await
    }
}

pub struct GetContentTool;

#[async_trait]
impl Tool for GetContentTool {
    fn name(&self) -> &str {
        "get_content"
    }

    fn description(&self) -> &str {
        "Get one content item by key, GUID or numeric id"
    }

    fn parameters_schema(&self) -> Value {
        let mut props = selection_properties();
        props.insert("id".into(), json!({ "type": "string", "description": "Content key or id" }));
        object_schema(props, &["id"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: GetByIdParams = parse(&params)?;
        let built = ctx.builder_for(&params)?.build_get_by_id(&request).await?;
        ctx.run(built, &params).await
    }
}

pub struct GetContentByPathTool;

#[async_trait]
impl Tool for GetContentByPathTool {
    fn name(&self) -> &str {
        "get_content_by_path"
    }

    fn description(&self) -> &str {
        "Get one content item by its URL path"
    }

    fn parameters_schema(&self) -> Value {
        let mut props = selection_properties();
        props.insert(
            "path".into(),
            json!({ "type": "string", "description": "URL path, e.g. /en/news/" }),
        );
        object_schema(props, &["path"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: GetByPathParams = parse(&params)?;
        let built = ctx.builder_for(&params)?.build_get_by_path(&request).await?;
        ctx.run(built, &params).await
    }
}

pub struct FacetedSearchTool;

#[async_trait]
impl Tool for FacetedSearchTool {
    fn name(&self) -> &str {
        "faceted_search"
    }

    fn description(&self) -> &str {
        "Search content and return facet counts"
    }

    fn parameters_schema(&self) -> Value {
        let mut props = search_properties();
        props.insert(
            "facets".into(),
            json!({
                "type": "object",
                "description": "facetName → { field, limit }; field may be dotted (_metadata.types)"
            }),
        );
        object_schema(props, &["facets"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: FacetedSearchParams = parse(&params)?;
        let built = ctx.builder_for(&params)?.build_faceted_search(&request).await?;
        ctx.run(built, &params).await
    }
}

pub struct RelatedContentTool;

#[async_trait]
impl Tool for RelatedContentTool {
    fn name(&self) -> &str {
        "related_content"
    }

    fn description(&self) -> &str {
        "Find items sharing terms with a source item"
    }

    fn parameters_schema(&self) -> Value {
        let mut props = selection_properties();
        props.insert(
            "id".into(),
            json!({ "type": "string", "description": "Key of the source item to exclude" }),
        );
        props.insert(
            "terms".into(),
            json!({ "type": "array", "items": { "type": "string" }, "description": "Terms to relate on" }),
        );
        props.insert("limit".into(), json!({ "type": "integer", "description": "Max items" }));
        object_schema(props, &["terms"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: RelatedContentParams = parse(&params)?;
        let built = ctx.builder_for(&params)?.build_related_content(&request).await?;
        ctx.run(built, &params).await
    }
}

pub struct MapFieldsTool;

#[async_trait]
impl Tool for MapFieldsTool {
    fn name(&self) -> &str {
        "map_fields"
    }

    fn description(&self) -> &str {
        "Map informal property names onto the fields of a content type"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content_type": { "type": "string" },
                "properties": { "type": "object", "description": "Property name → value" }
            },
            "required": ["content_type", "properties"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let content_type = params["content_type"].as_str().unwrap_or("");
        if content_type.trim().is_empty() {
            bail!("content_type must not be empty");
        }
        let props = params["properties"].as_object().cloned().unwrap_or_default();
        let result = ctx
            .services()
            .field_mapper()
            .map_fields_dynamically(content_type, &props)
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

pub struct MatchContentTypeTool;

#[async_trait]
impl Tool for MatchContentTypeTool {
    fn name(&self) -> &str {
        "match_content_type"
    }

    fn description(&self) -> &str {
        "Rank content types against a free-text hint"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "hint": { "type": "string", "description": "e.g. \"blog\"" },
                "context": { "type": "string", "description": "Extra words describing the content" }
            },
            "required": ["hint"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let hint = params["hint"].as_str().unwrap_or("");
        if hint.trim().is_empty() {
            bail!("hint must not be empty");
        }
        let result = ctx
            .services()
            .match_content_type(hint, params["context"].as_str())
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

pub struct GetFragmentTool;

#[async_trait]
impl Tool for GetFragmentTool {
    fn name(&self) -> &str {
        "get_fragment"
    }

    fn description(&self) -> &str {
        "Get a generated GraphQL fragment (AllComponents or <Type>Fields)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Fragment name; omit to list available" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let fragments = ctx.services().fragments();
        match params["name"].as_str().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Ok(serde_json::to_value(fragments.get_fragment(name).await?)?),
            None => Ok(json!({ "available": fragments.available().await? })),
        }
    }
}

pub struct InvalidateCacheTool;

#[async_trait]
impl Tool for InvalidateCacheTool {
    fn name(&self) -> &str {
        "invalidate_cache"
    }

    fn description(&self) -> &str {
        "Drop the cached schema, discovery results and fragments"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "all_instances": {
                    "type": "boolean",
                    "default": false,
                    "description": "Also delete fragment caches of other endpoints and schema versions"
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let services = ctx.services();
        services.invalidate_all().await?;
        let removed = if params["all_instances"].as_bool().unwrap_or(false) {
            clear_root(&services.config().cache.dir)?
        } else {
            0
        };
        Ok(json!({ "invalidated": true, "removed_instances": removed }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registered tools, in registration order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry holding every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DiscoverSchemaTool));
        registry.register(Box::new(SearchContentTool));
        registry.register(Box::new(GetContentTool));
        registry.register(Box::new(GetContentByPathTool));
        registry.register(Box::new(FacetedSearchTool));
        registry.register(Box::new(RelatedContentTool));
        registry.register(Box::new(MapFieldsTool));
        registry.register(Box::new(MatchContentTypeTool));
        registry.register(Box::new(GetFragmentTool));
        registry.register(Box::new(InvalidateCacheTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
