//! Dynamic GraphQL query synthesis.
//!
//! Every document is built from the discovered [`SchemaSnapshot`]; no
//! content type or field name is assumed. Each build follows the same
//! steps:
//!
//! 1. Resolve the content root field (the root query field returning a
//!    collection of content). Its absence is a [`SchemaError`].
//! 2. Build the `where` argument from independent conditions (free text,
//!    content type, locale, caller filters, identifiers), each resolved
//!    against the where-input type. See [`where_clause`].
//! 3. Render `items` with a metadata block and one inline fragment per
//!    requested content type. See [`selection`].
//! 4. Bind caller values (search term, id, path, limit, skip, …) as
//!    variables, never as inline text.
//! 5. Normalize whitespace.
//!
//! [`QueryPlanner`] is the pure, synchronous part. [`DynamicQueryBuilder`]
//! wraps it with the introspector so build calls initialize on demand.
//!
//! ```text
//! query SearchContent($searchTerm: String, $limit: Int) {
//!   _Content(where: { _or: [...] }, limit: $limit) {
//!     items {
//!       __typename
//!       _metadata { key displayName ... }
//!       ... on ArticlePage { Title Body }
//!     }
//!     total
//!   }
//! }
//! ```

mod selection;
mod where_clause;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::QueryConfig;
use crate::introspector::{InitState, SchemaIntrospector};
use crate::schema::{ContentRoot, FieldDef, SchemaSnapshot};
use crate::type_matcher::{candidates_from_snapshot, match_content_type};

pub(crate) use selection::SelectionRenderer;
use where_clause::{is_valid_name, Literal, Variables, WhereBuilder};

/// Minimum matcher score for a fuzzy content-type name to be accepted.
const MIN_TYPE_SCORE: u32 = 50;

const DEFAULT_FACET_LIMIT: u32 = 10;

/// A schema lacks something every query needs.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error(
        "no content query field found on '{query_type}': expected a root field returning an object with an `items` list of content"
    )]
    NoContentRoot { query_type: String },
    #[error("no {capability} found on '{on}'")]
    MissingCapability { capability: &'static str, on: String },
}

/// Selection options shared by every build.
///
/// Built from `[query]` in the config; tools override the selection
/// fields per call through [`DynamicQueryBuilder::with_options`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBuilderOptions {
    /// Select the `_metadata` block on content items.
    pub include_metadata: bool,
    /// Nesting depth for object fields; 1 selects scalars only.
    pub max_depth: usize,
    /// Ceiling for `max_depth`. Rendering never recurses past it.
    #[serde(default = "default_max_depth_limit")]
    pub max_depth_limit: usize,
    /// Only select these top-level fields (empty means all).
    #[serde(default)]
    pub include_fields: Option<Vec<String>>,
    /// Never select these top-level fields.
    #[serde(default)]
    pub exclude_fields: Option<Vec<String>>,
    /// Content types used when a request names none.
    #[serde(default)]
    pub content_types: Option<Vec<String>>,
    /// `limit` when a request gives none.
    pub default_limit: u32,
    /// Requested limits are clamped to this.
    pub max_limit: u32,
}

fn default_max_depth_limit() -> usize {
    QueryConfig::default().max_depth_limit
}

impl Default for QueryBuilderOptions {
    fn default() -> Self {
        Self::from(&QueryConfig::default())
    }
}

impl From<&QueryConfig> for QueryBuilderOptions {
    fn from(cfg: &QueryConfig) -> Self {
        Self {
            include_metadata: cfg.include_metadata,
            max_depth: cfg.max_depth,
            max_depth_limit: cfg.max_depth_limit,
            include_fields: None,
            exclude_fields: None,
            content_types: None,
            default_limit: cfg.default_limit,
            max_limit: cfg.max_limit,
        }
    }
}

/// A synthesized document with its variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    /// GraphQL document text. Caller values never appear in it.
    pub query: String,
    /// Values for every `$variable` the document declares.
    pub variables: Map<String, Value>,
    /// Name of the single operation, e.g. `"SearchContent"`.
    pub operation_name: String,
}

// ── Request parameters ──────────────────────────────────────────────

/// Free-text and filtered search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    /// Matched through `_fulltext` when the where input has it.
    #[serde(default)]
    pub search_term: Option<String>,
    /// Type names, resolved fuzzily against the snapshot.
    #[serde(default)]
    pub content_types: Vec<String>,
    #[serde(default)]
    pub locale: Option<String>,
    /// Scalar → `eq`, array → `in`, object → operator object.
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub skip: Option<u32>,
}

/// One item by key, GUID or numeric id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetByIdParams {
    pub id: String,
    #[serde(default)]
    pub content_types: Vec<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// One item by URL path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetByPathParams {
    pub path: String,
    #[serde(default)]
    pub content_types: Vec<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// One facet: the (possibly dotted) field to aggregate and a bucket limit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FacetSpec {
    pub field: String,
    #[serde(default = "default_facet_limit")]
    pub limit: u32,
}

fn default_facet_limit() -> u32 {
    DEFAULT_FACET_LIMIT
}

/// A search plus named facets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacetedSearchParams {
    #[serde(flatten)]
    pub search: SearchParams,
    #[serde(default)]
    pub facets: BTreeMap<String, FacetSpec>,
}

/// Items sharing `terms` with a source item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelatedContentParams {
    /// Key of the source item, excluded from the results.
    #[serde(default)]
    pub id: Option<String>,
    pub terms: Vec<String>,
    #[serde(default)]
    pub content_types: Vec<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

// ═══════════════════════════════════════════════════════════════════════
// Planner
// ═══════════════════════════════════════════════════════════════════════

/// Builds documents against one snapshot.
pub struct QueryPlanner<'a> {
    snapshot: &'a SchemaSnapshot,
    options: &'a QueryBuilderOptions,
}

/// Root field, where builder, variables and extra root arguments of one
/// document under construction.
struct Plan<'a> {
    root: &'a ContentRoot,
    field: &'a FieldDef,
    filters: Option<WhereBuilder<'a>>,
    vars: Variables,
    args: Vec<(String, Literal)>,
}

impl<'a> Plan<'a> {
    fn require_where(&mut self) -> Result<&mut WhereBuilder<'a>> {
        let on = self.root.field.clone();
        self.filters.as_mut().ok_or_else(|| {
            SchemaError::MissingCapability {
                capability: "where input type",
                on,
            }
            .into()
        })
    }

    fn free_text(&mut self, var: &str, term: &str) -> Result<()> {
        let mut vars = std::mem::take(&mut self.vars);
        let wb = self.require_where()?;
        let added = wb.free_text(&mut vars, var, term);
        let input = wb.input_name().to_string();
        self.vars = vars;
        if !added {
            return Err(SchemaError::MissingCapability {
                capability: "searchable filter field",
                on: input,
            }
            .into());
        }
        Ok(())
    }

    fn type_filter(&mut self, types: &[String]) {
        if types.is_empty() {
            return;
        }
        let applied = match self.filters.as_mut() {
            Some(wb) => wb.type_filter(&mut self.vars, types),
            None => false,
        };
        if !applied {
            debug!(root = %self.root.field, "No type filter shape in where input; filtering by type dropped");
        }
    }

    fn locale(&mut self, locale: Option<&str>) {
        let Some(locale) = locale.map(str::trim).filter(|l| !l.is_empty()) else {
            return;
        };
        if let Some(arg) = self.field.arg("locale") {
            let value = if arg.ty.is_list() {
                json!([locale])
            } else {
                json!(locale)
            };
            let var_ref = self.vars.declare("locale", arg.ty.to_string(), value);
            self.args.push(("locale".to_string(), var_ref));
            return;
        }
        let applied = match self.filters.as_mut() {
            Some(wb) => wb.locale_filter(&mut self.vars, locale),
            None => false,
        };
        if !applied {
            debug!(root = %self.root.field, "No locale filter available; locale dropped");
        }
    }

    fn caller_filters(&mut self, filters: &Map<String, Value>) {
        if filters.is_empty() {
            return;
        }
        match self.filters.as_mut() {
            Some(wb) => wb.caller_filters(filters),
            None => warn!(root = %self.root.field, "No where input; caller filters dropped"),
        }
    }

    /// Bind a root argument when the content root declares it.
    fn root_arg(&mut self, name: &str, value: Option<u32>) {
        let (Some(value), Some(arg)) = (value, self.field.arg(name)) else {
            return;
        };
        let var_ref = self.vars.declare(name, arg.ty.to_string(), json!(value));
        self.args.push((name.to_string(), var_ref));
    }
}

impl<'a> QueryPlanner<'a> {
    pub fn new(snapshot: &'a SchemaSnapshot, options: &'a QueryBuilderOptions) -> Self {
        Self { snapshot, options }
    }

    /// Free-text / filtered search over the content root.
    pub fn search(&self, params: &SearchParams) -> Result<BuiltQuery> {
        let (plan, types) = self.search_plan(params)?;
        Ok(self.render(plan, "SearchContent", &types, &[]))
    }

    /// A single item by id, trying every identifier field the schema has.
    pub fn get_by_id(&self, params: &GetByIdParams) -> Result<BuiltQuery> {
        let id = params.id.trim();
        if id.is_empty() {
            bail!("id must not be empty");
        }
        let mut plan = self.plan()?;
        let wb = plan.require_where()?;
        let input = wb.input_name().to_string();
        let mut vars = Variables::default();
        if !wb.id_filter(&mut vars, id) {
            return Err(SchemaError::MissingCapability {
                capability: "identifier filter field",
                on: input,
            }
            .into());
        }
        plan.vars = vars;
        plan.locale(params.locale.as_deref());
        let types = self.detail_types(plan.root, &params.content_types);
        Ok(self.render(plan, "GetContentById", &types, &[]))
    }

    /// A single item by URL path, with and without a trailing slash.
    pub fn get_by_path(&self, params: &GetByPathParams) -> Result<BuiltQuery> {
        let path = params.path.trim();
        if path.is_empty() {
            bail!("path must not be empty");
        }
        let mut plan = self.plan()?;
        let wb = plan.require_where()?;
        let input = wb.input_name().to_string();
        let mut vars = Variables::default();
        if !wb.path_filter(&mut vars, path) {
            return Err(SchemaError::MissingCapability {
                capability: "path filter field",
                on: input,
            }
            .into());
        }
        plan.vars = vars;
        plan.locale(params.locale.as_deref());
        let types = self.detail_types(plan.root, &params.content_types);
        Ok(self.render(plan, "GetContentByPath", &types, &[]))
    }

    /// Search plus one facet sub-selection per requested facet.
    ///
    /// Facet fields are emitted as given; only their syntax is checked.
    pub fn faceted_search(&self, params: &FacetedSearchParams) -> Result<BuiltQuery> {
        if params.facets.is_empty() {
            bail!("faceted search needs at least one facet");
        }
        let (plan, types) = self.search_plan(&params.search)?;
        let collection = self
            .snapshot
            .get_type(&plan.root.collection_type)
            .filter(|c| c.field("facets").is_some());
        if collection.is_none() {
            return Err(SchemaError::MissingCapability {
                capability: "facets field",
                on: plan.root.collection_type.clone(),
            }
            .into());
        }
        let facet_lines = render_facets(&params.facets)?;
        Ok(self.render(plan, "FacetedSearch", &types, &facet_lines))
    }

    /// Items sharing terms with a source item, excluding the item itself.
    pub fn related_content(&self, params: &RelatedContentParams) -> Result<BuiltQuery> {
        let terms: Vec<&str> = params
            .terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            bail!("related content needs at least one term");
        }

        let mut plan = self.plan()?;
        plan.free_text("relatedTerms", &terms.join(" "))?;
        if let Some(id) = params.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let excluded = match plan.filters.as_mut() {
                Some(wb) => wb.exclude_id(&mut plan.vars, id),
                None => false,
            };
            if !excluded {
                debug!(id, "No negation filter available; source item not excluded");
            }
        }
        let types = self.resolve_types(&params.content_types);
        plan.type_filter(&types);
        plan.locale(params.locale.as_deref());
        plan.root_arg("limit", Some(self.limit(params.limit)));
        Ok(self.render(plan, "RelatedContent", &types, &[]))
    }

    // ── Internals ───────────────────────────────────────────────────

    fn plan(&self) -> Result<Plan<'a>> {
        let root = self
            .snapshot
            .content_root()
            .ok_or_else(|| SchemaError::NoContentRoot {
                query_type: self.snapshot.query_type_name().to_string(),
            })?;
        let Some(field) = self.snapshot.root_field(&root.field) else {
            return Err(SchemaError::NoContentRoot {
                query_type: self.snapshot.query_type_name().to_string(),
            }
            .into());
        };
        let filters = self
            .snapshot
            .where_input_type(&root.field)
            .map(|input| WhereBuilder::new(self.snapshot, input));
        Ok(Plan {
            root,
            field,
            filters,
            vars: Variables::default(),
            args: Vec::new(),
        })
    }

    fn search_plan(&self, params: &SearchParams) -> Result<(Plan<'a>, Vec<String>)> {
        let mut plan = self.plan()?;
        if let Some(term) = params
            .search_term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            plan.free_text("searchTerm", term)?;
        }
        let types = self.resolve_types(&params.content_types);
        plan.type_filter(&types);
        plan.locale(params.locale.as_deref());
        plan.caller_filters(&params.filters);
        plan.root_arg("limit", Some(self.limit(params.limit)));
        plan.root_arg("skip", params.skip);
        Ok((plan, types))
    }

    fn limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.options.default_limit)
            .clamp(1, self.options.max_limit.max(1))
    }

    /// Map requested names onto content types.
    ///
    /// Exact (case-insensitive) names win; otherwise the content-type
    /// matcher's best candidate is taken when it scores high enough.
    fn resolve_types(&self, requested: &[String]) -> Vec<String> {
        let requested: &[String] = if requested.is_empty() {
            self.options.content_types.as_deref().unwrap_or_default()
        } else {
            requested
        };
        if requested.is_empty() {
            return Vec::new();
        }

        let candidates = candidates_from_snapshot(self.snapshot);
        let mut out: Vec<String> = Vec::new();
        for name in requested {
            let exact = self
                .snapshot
                .content_types()
                .keys()
                .find(|k| k.eq_ignore_ascii_case(name.trim()))
                .cloned();
            let resolved = exact.or_else(|| {
                match_content_type(name, None, &candidates)
                    .best_match
                    .filter(|m| m.score >= MIN_TYPE_SCORE)
                    .map(|m| m.key)
            });
            match resolved {
                Some(t) if !out.contains(&t) => out.push(t),
                Some(_) => {}
                None => warn!(content_type = %name, "Unknown content type dropped"),
            }
        }
        out
    }

    /// Types to expand for single-item reads: the requested ones, or every
    /// content type implementing the item interface.
    fn detail_types(&self, root: &ContentRoot, requested: &[String]) -> Vec<String> {
        let resolved = self.resolve_types(requested);
        if !resolved.is_empty() {
            return resolved;
        }
        self.snapshot
            .content_types()
            .keys()
            .filter(|t| self.snapshot.implements(t, &root.item_type))
            .cloned()
            .collect()
    }

    fn render(&self, plan: Plan<'_>, operation: &str, types: &[String], extra: &[String]) -> BuiltQuery {
        let Plan {
            root,
            filters,
            vars,
            args,
            ..
        } = plan;

        let mut arg_text = Vec::new();
        if let Some(condition) = filters.and_then(WhereBuilder::finish) {
            arg_text.push(format!("where: {}", condition.render()));
        }
        arg_text.extend(args.iter().map(|(k, v)| format!("{}: {}", k, v.render())));

        let call = if arg_text.is_empty() {
            root.field.clone()
        } else {
            format!("{}({})", root.field, arg_text.join(", "))
        };

        let renderer = SelectionRenderer::new(self.snapshot, self.options);
        let mut lines = vec![
            format!("query {}{} {{", operation, vars.declarations()),
            selection::line(1, &format!("{} {{", call)),
        ];
        renderer.push_items(&root.item_type, types, 2, &mut lines);
        let has_total = self
            .snapshot
            .get_type(&root.collection_type)
            .and_then(|c| c.field("total"))
            .is_some();
        if has_total {
            lines.push(selection::line(2, "total"));
        }
        lines.extend(extra.iter().cloned());
        lines.push(selection::line(1, "}"));
        lines.push("}".to_string());

        BuiltQuery {
            query: normalize_whitespace(&lines.join("\n")),
            variables: vars.into_values(),
            operation_name: operation.to_string(),
        }
    }
}

/// `facets { <path> { alias: leaf(limit: N) { name count } } }`
fn render_facets(facets: &BTreeMap<String, FacetSpec>) -> Result<Vec<String>> {
    let mut lines = vec![selection::line(2, "facets {")];
    for (name, spec) in facets {
        if !is_valid_name(name) {
            bail!("invalid facet name '{}'", name);
        }
        let segments: Vec<&str> = spec.field.split('.').collect();
        if !segments.iter().all(|s| is_valid_name(s)) {
            bail!("invalid facet field '{}'", spec.field);
        }
        let (leaf, parents) = match segments.split_last() {
            Some(split) => split,
            None => bail!("invalid facet field '{}'", spec.field),
        };
        let mut indent = 3;
        for parent in parents {
            lines.push(selection::line(indent, &format!("{} {{", parent)));
            indent += 1;
        }
        let call = format!("{}(limit: {})", leaf, spec.limit.max(1));
        let head = if name == leaf {
            call
        } else {
            format!("{}: {}", name, call)
        };
        lines.push(selection::line(indent, &format!("{} {{", head)));
        lines.push(selection::line(indent + 1, "name"));
        lines.push(selection::line(indent + 1, "count"));
        lines.push(selection::line(indent, "}"));
        for _ in parents {
            indent -= 1;
            lines.push(selection::line(indent, "}"));
        }
    }
    lines.push(selection::line(2, "}"));
    Ok(lines)
}

/// Trim trailing whitespace, drop blank lines, trim the whole document.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ═══════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════

/// Query builder bound to an introspector.
///
/// Build calls initialize the introspector on demand, so the builder moves
/// `Uninitialized → Initializing → Ready` with it.
#[derive(Clone)]
pub struct DynamicQueryBuilder {
    introspector: Arc<SchemaIntrospector>,
    options: QueryBuilderOptions,
}

impl DynamicQueryBuilder {
    pub fn new(introspector: Arc<SchemaIntrospector>, options: QueryBuilderOptions) -> Self {
        Self {
            introspector,
            options,
        }
    }

    pub fn options(&self) -> &QueryBuilderOptions {
        &self.options
    }

    /// A builder over the same introspector with different options.
    pub fn with_options(&self, options: QueryBuilderOptions) -> Self {
        Self {
            introspector: self.introspector.clone(),
            options,
        }
    }

    pub fn state(&self) -> InitState {
        self.introspector.state()
    }

    pub async fn initialize(&self) -> Result<()> {
        self.introspector.initialize().await.map(|_| ())
    }

    pub async fn build_search(&self, params: &SearchParams) -> Result<BuiltQuery> {
        let snapshot = self.introspector.initialize().await?;
        QueryPlanner::new(&snapshot, &self.options).search(params)
    }

    pub async fn build_get_by_id(&self, params: &GetByIdParams) -> Result<BuiltQuery> {
        let snapshot = self.introspector.initialize().await?;
        QueryPlanner::new(&snapshot, &self.options).get_by_id(params)
    }

    pub async fn build_get_by_path(&self, params: &GetByPathParams) -> Result<BuiltQuery> {
        let snapshot = self.introspector.initialize().await?;
        QueryPlanner::new(&snapshot, &self.options).get_by_path(params)
    }

    pub async fn build_faceted_search(&self, params: &FacetedSearchParams) -> Result<BuiltQuery> {
        let snapshot = self.introspector.initialize().await?;
        QueryPlanner::new(&snapshot, &self.options).faceted_search(params)
    }

    pub async fn build_related_content(&self, params: &RelatedContentParams) -> Result<BuiltQuery> {
        let snapshot = self.introspector.initialize().await?;
        QueryPlanner::new(&snapshot, &self.options).related_content(params)
    }
}
