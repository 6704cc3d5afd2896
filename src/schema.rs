//! GraphQL schema model built from an introspection response.
//!
//! The remote CMS schema is not known at compile time. This module decodes a
//! standard introspection result into a [`SchemaSnapshot`]: an immutable view
//! of the types, the content types, and the filter/search capabilities that
//! the query builder relies on.
//!
//! # Content types
//!
//! A type counts as *content* when it is an object or interface type that
//! either implements one of the content marker interfaces (`_IContent`,
//! `IContent`) or exposes the metadata field (`_metadata`). GraphQL meta types
//! (`__Schema`, `__Type`, ...) and the root operation types are never content.
//!
//! # Content root
//!
//! The *content root* is the root query field that returns a collection of
//! content: an object type with an `items` list whose element type is a
//! content interface. All generated queries select from this field.
//!
//! # Schema version
//!
//! [`SchemaSnapshot::schema_version`] hashes the sorted list of root query
//! field names. It changes when a top-level query capability is added,
//! removed, or renamed, and does not see field-level changes deeper in the
//! schema.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Interfaces that mark a type as CMS content.
pub const CONTENT_INTERFACES: &[&str] = &["_IContent", "IContent"];

/// Field carrying CMS metadata (key, display name, url, types, ...).
pub const METADATA_FIELD: &str = "_metadata";

/// Metadata sub-field holding the human-readable name of an item.
pub const DISPLAY_NAME_FIELD: &str = "displayName";

/// Name fragments that make a text field searchable.
pub const SEARCHABLE_PATTERNS: &[&str] = &[
    "title",
    "heading",
    "name",
    "description",
    "text",
    "content",
    "summary",
    "body",
];

/// Scalars treated as free text.
const TEXT_SCALARS: &[&str] = &["String", "SearchableString"];

/// Root field names preferred when several content collections exist.
const PREFERRED_CONTENT_ROOTS: &[&str] = &["_Content", "Content", "_IContent", "IContent"];

// ═══════════════════════════════════════════════════════════════════════
// Type references
// ═══════════════════════════════════════════════════════════════════════

/// A GraphQL type reference with its list / non-null modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// The named type at the bottom of the modifier chain.
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.base_name(),
        }
    }

    /// True when any modifier in the chain is a list.
    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::Named(_) => false,
            TypeRef::List(_) => true,
            TypeRef::NonNull(inner) => inner.is_list(),
        }
    }

    /// True when the outermost modifier is non-null.
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// Wire form of a type reference (`{ kind, name, ofType }`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTypeRef {
    kind: TypeKind,
    name: Option<String>,
    of_type: Option<Box<RawTypeRef>>,
}

impl TryFrom<RawTypeRef> for TypeRef {
    type Error = anyhow::Error;

    fn try_from(raw: RawTypeRef) -> Result<Self> {
        match raw.kind {
            TypeKind::List => {
                let inner = raw.of_type.ok_or_else(|| anyhow!("LIST type without ofType"))?;
                Ok(TypeRef::List(Box::new(TypeRef::try_from(*inner)?)))
            }
            TypeKind::NonNull => {
                let inner = raw
                    .of_type
                    .ok_or_else(|| anyhow!("NON_NULL type without ofType"))?;
                Ok(TypeRef::NonNull(Box::new(TypeRef::try_from(*inner)?)))
            }
            _ => raw
                .name
                .map(TypeRef::Named)
                .ok_or_else(|| anyhow!("named type reference without a name")),
        }
    }
}

/// The `__TypeKind` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

impl TypeKind {
    /// Whether a field of this kind needs a sub-selection.
    pub fn is_composite(self) -> bool {
        matches!(self, TypeKind::Object | TypeKind::Interface | TypeKind::Union)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Introspection wire format
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    query_type: Option<RawNamed>,
    mutation_type: Option<RawNamed>,
    subscription_type: Option<RawNamed>,
    #[serde(default)]
    types: Vec<RawFullType>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFullType {
    kind: TypeKind,
    name: String,
    description: Option<String>,
    fields: Option<Vec<RawField>>,
    input_fields: Option<Vec<RawInputValue>>,
    interfaces: Option<Vec<RawTypeRef>>,
    enum_values: Option<Vec<RawEnumValue>>,
    possible_types: Option<Vec<RawTypeRef>>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    description: Option<String>,
    #[serde(default)]
    args: Vec<RawInputValue>,
    #[serde(rename = "type")]
    ty: RawTypeRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInputValue {
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    ty: RawTypeRef,
    default_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEnumValue {
    name: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Decoded schema
// ═══════════════════════════════════════════════════════════════════════

/// An argument or input-object field.
#[derive(Debug, Clone)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    /// Default as GraphQL literal text, e.g. `"20"`.
    pub default_value: Option<String>,
}

/// A field on an object or interface type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub args: Vec<InputValueDef>,
    pub ty: TypeRef,
}

impl FieldDef {
    /// Find an argument by name.
    pub fn arg(&self, name: &str) -> Option<&InputValueDef> {
        self.args.iter().find(|a| a.name == name)
    }

    /// Whether selecting this field requires arguments we cannot supply.
    pub fn has_required_args(&self) -> bool {
        self.args
            .iter()
            .any(|a| a.ty.is_non_null() && a.default_value.is_none())
    }
}

/// A named type from the schema.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    /// Output fields; empty for scalars, enums, unions and inputs.
    pub fields: Vec<FieldDef>,
    /// Fields of an input object; empty otherwise.
    pub input_fields: Vec<InputValueDef>,
    /// Interfaces an object or interface implements.
    pub interfaces: Vec<String>,
    /// Members of a union, or implementors of an interface.
    pub possible_types: Vec<String>,
    pub enum_values: Vec<String>,
}

impl TypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn input_field(&self, name: &str) -> Option<&InputValueDef> {
        self.input_fields.iter().find(|f| f.name == name)
    }
}

/// Information about a field of a content type, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    /// Base named type (modifiers stripped), e.g. `"String"`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Full GraphQL type expression, e.g. `"[String]!"`.
    pub graphql_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Non-null at the outermost level.
    pub is_required: bool,
    pub is_list: bool,
    /// Listed by [`SchemaSnapshot::searchable_fields`].
    pub is_searchable: bool,
    /// Present on the content root's `where` input.
    pub is_filterable: bool,
}

/// A content type and its fields.
///
/// An object type counts as content when it implements one of the content
/// marker interfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentTypeInfo {
    /// GraphQL type name, e.g. `"ArticlePage"`.
    pub name: String,
    /// Fields keyed by name, in name order.
    pub fields: BTreeMap<String, FieldInfo>,
    /// Interfaces the type implements, as declared.
    pub interfaces: Vec<String>,
    /// Type description from introspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The root field that returns content collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRoot {
    /// Root query field name, e.g. `"_Content"`.
    pub field: String,
    /// Collection (output) type, e.g. `"_ContentOutput"`.
    pub collection_type: String,
    /// Element type of `items`, e.g. `"_IContent"`.
    pub item_type: String,
}

/// Immutable view of one introspection fetch.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    query_type: String,
    root_types: BTreeSet<String>,
    types: BTreeMap<String, TypeDef>,
    content_types: BTreeMap<String, ContentTypeInfo>,
    searchable_fields: BTreeSet<String>,
    filterable_fields: BTreeSet<String>,
    content_root: Option<ContentRoot>,
    schema_version: String,
}

impl SchemaSnapshot {
    /// Decode an introspection response.
    ///
    /// Accepts the full HTTP response (`{"data": {"__schema": ...}}`), the
    /// `data` object (`{"__schema": ...}`), or the bare schema object.
    pub fn from_introspection(value: &serde_json::Value) -> Result<Self> {
        let schema_value = value
            .pointer("/data/__schema")
            .or_else(|| value.get("__schema"))
            .unwrap_or(value);

        let raw: RawSchema = serde_json::from_value(schema_value.clone())
            .context("Invalid introspection response")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSchema) -> Result<Self> {
        let query_type = match raw.query_type {
            Some(q) => q.name,
            None => bail!("Introspection response has no query type"),
        };

        let mut root_types = BTreeSet::new();
        root_types.insert(query_type.clone());
        for t in [raw.mutation_type, raw.subscription_type].into_iter().flatten() {
            root_types.insert(t.name);
        }

        let mut types = BTreeMap::new();
        for raw_type in raw.types {
            let def = decode_type(raw_type)?;
            types.insert(def.name.clone(), def);
        }

        if !types.contains_key(&query_type) {
            bail!("Query type '{}' missing from introspection types", query_type);
        }

        let mut snapshot = Self {
            query_type,
            root_types,
            types,
            content_types: BTreeMap::new(),
            searchable_fields: BTreeSet::new(),
            filterable_fields: BTreeSet::new(),
            content_root: None,
            schema_version: String::new(),
        };

        snapshot.schema_version = snapshot.compute_schema_version();
        snapshot.content_root = snapshot.resolve_content_root();
        snapshot.filterable_fields = snapshot.compute_filterable_fields();
        snapshot.searchable_fields = snapshot.compute_searchable_fields();
        snapshot.content_types = snapshot.compute_content_types();

        Ok(snapshot)
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn query_type_name(&self) -> &str {
        &self.query_type
    }

    pub fn query_type(&self) -> Option<&TypeDef> {
        self.types.get(&self.query_type)
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn content_types(&self) -> &BTreeMap<String, ContentTypeInfo> {
        &self.content_types
    }

    pub fn content_type(&self, name: &str) -> Option<&ContentTypeInfo> {
        self.content_types.get(name)
    }

    /// Sorted content type names.
    pub fn content_type_names(&self) -> Vec<String> {
        self.content_types.keys().cloned().collect()
    }

    pub fn searchable_fields(&self) -> &BTreeSet<String> {
        &self.searchable_fields
    }

    pub fn filterable_fields(&self) -> &BTreeSet<String> {
        &self.filterable_fields
    }

    pub fn content_root(&self) -> Option<&ContentRoot> {
        self.content_root.as_ref()
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Sorted names of the root query fields.
    pub fn root_query_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .query_type()
            .map(|q| q.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// A field on the root query type.
    pub fn root_field(&self, name: &str) -> Option<&FieldDef> {
        self.query_type().and_then(|q| q.field(name))
    }

    /// Fields of an object or interface type; empty for anything else.
    pub fn fields_for_type(&self, type_name: &str) -> Vec<FieldInfo> {
        if let Some(ct) = self.content_types.get(type_name) {
            return ct.fields.values().cloned().collect();
        }
        match self.types.get(type_name) {
            Some(t) if matches!(t.kind, TypeKind::Object | TypeKind::Interface) => t
                .fields
                .iter()
                .map(|f| self.field_info(f))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Input type of the `where` argument on a root query field.
    pub fn where_input_type(&self, query_field: &str) -> Option<&TypeDef> {
        let field = self.root_field(query_field)?;
        let arg = field.arg("where")?;
        self.types
            .get(arg.ty.base_name())
            .filter(|t| t.kind == TypeKind::InputObject)
    }

    /// Resolve a dot path through nested input objects.
    ///
    /// Returns the input type that the last path segment points at, e.g.
    /// `"_metadata.key"` on `_ContentWhereInput` → `StringFilterInput`.
    pub fn resolve_input_path(&self, input_type: &str, path: &str) -> Option<&TypeDef> {
        let mut current = self.types.get(input_type)?;
        for segment in path.split('.') {
            let field = current.input_field(segment)?;
            current = self.types.get(field.ty.base_name())?;
        }
        Some(current)
    }

    /// Whether `name` implements `interface` (or is that interface).
    pub fn implements(&self, name: &str, interface: &str) -> bool {
        if name == interface {
            return true;
        }
        if let Some(t) = self.types.get(name) {
            if t.interfaces.iter().any(|i| i == interface) {
                return true;
            }
        }
        self.types
            .get(interface)
            .map(|i| i.possible_types.iter().any(|p| p == name))
            .unwrap_or(false)
    }

    /// Whether `name` is an interface that marks content.
    pub fn is_content_interface(&self, name: &str) -> bool {
        match self.types.get(name) {
            Some(t) if t.kind == TypeKind::Interface => {
                CONTENT_INTERFACES.contains(&name) || t.field(METADATA_FIELD).is_some()
            }
            _ => false,
        }
    }

    fn field_info(&self, field: &FieldDef) -> FieldInfo {
        FieldInfo {
            name: field.name.clone(),
            type_name: field.ty.base_name().to_string(),
            graphql_type: field.ty.to_string(),
            description: field.description.clone(),
            is_required: field.ty.is_non_null(),
            is_list: field.ty.is_list(),
            is_searchable: is_searchable_field(&field.name, field.ty.base_name()),
            is_filterable: self.filterable_fields.contains(&field.name),
        }
    }

    // ── Derivations ──────────────────────────────────────────────────

    fn compute_schema_version(&self) -> String {
        let names = self.root_query_fields();
        let mut hasher = Sha256::new();
        hasher.update(names.join(",").as_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    }

    fn is_content_type(&self, t: &TypeDef) -> bool {
        if t.name.starts_with("__") || self.root_types.contains(&t.name) {
            return false;
        }
        if !matches!(t.kind, TypeKind::Object | TypeKind::Interface) {
            return false;
        }
        t.interfaces
            .iter()
            .any(|i| CONTENT_INTERFACES.contains(&i.as_str()))
            || t.field(METADATA_FIELD).is_some()
    }

    fn compute_content_types(&self) -> BTreeMap<String, ContentTypeInfo> {
        self.types
            .values()
            .filter(|t| t.kind == TypeKind::Object && self.is_content_type(t))
            .map(|t| {
                let fields = t
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), self.field_info(f)))
                    .collect();
                (
                    t.name.clone(),
                    ContentTypeInfo {
                        name: t.name.clone(),
                        fields,
                        interfaces: t.interfaces.clone(),
                        description: t.description.clone(),
                    },
                )
            })
            .collect()
    }

    fn compute_searchable_fields(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for t in self.types.values() {
            if t.kind != TypeKind::Object || !self.is_content_type(t) {
                continue;
            }
            for f in &t.fields {
                if is_searchable_field(&f.name, f.ty.base_name()) {
                    out.insert(f.name.clone());
                }
            }
        }
        out.insert(format!("{}.{}", METADATA_FIELD, DISPLAY_NAME_FIELD));
        out
    }

    fn compute_filterable_fields(&self) -> BTreeSet<String> {
        let Some(root) = &self.content_root else {
            return BTreeSet::new();
        };
        self.where_input_type(&root.field)
            .map(|w| w.input_fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Find the root query field returning a content collection.
    fn resolve_content_root(&self) -> Option<ContentRoot> {
        let query = self.query_type()?;
        let mut candidates: Vec<ContentRoot> = query
            .fields
            .iter()
            .filter_map(|f| {
                let collection = self.types.get(f.ty.base_name())?;
                if collection.kind != TypeKind::Object {
                    return None;
                }
                let items = collection.field("items")?;
                if !items.ty.is_list() || !self.is_content_interface(items.ty.base_name()) {
                    return None;
                }
                Some(ContentRoot {
                    field: f.name.clone(),
                    collection_type: collection.name.clone(),
                    item_type: items.ty.base_name().to_string(),
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            let rank = |r: &ContentRoot| {
                PREFERRED_CONTENT_ROOTS
                    .iter()
                    .position(|p| *p == r.field)
                    .unwrap_or(PREFERRED_CONTENT_ROOTS.len())
            };
            rank(a).cmp(&rank(b)).then_with(|| a.field.cmp(&b.field))
        });
        candidates.into_iter().next()
    }
}

fn decode_type(raw: RawFullType) -> Result<TypeDef> {
    let fields = raw
        .fields
        .unwrap_or_default()
        .into_iter()
        .map(|f| {
            Ok(FieldDef {
                name: f.name,
                description: f.description,
                args: f
                    .args
                    .into_iter()
                    .map(decode_input_value)
                    .collect::<Result<_>>()?,
                ty: TypeRef::try_from(f.ty)?,
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Invalid field on type '{}'", raw.name))?;

    let input_fields = raw
        .input_fields
        .unwrap_or_default()
        .into_iter()
        .map(decode_input_value)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Invalid input field on type '{}'", raw.name))?;

    let names = |refs: Option<Vec<RawTypeRef>>| -> Vec<String> {
        refs.unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.name)
            .collect()
    };

    Ok(TypeDef {
        name: raw.name,
        kind: raw.kind,
        description: raw.description,
        fields,
        input_fields,
        interfaces: names(raw.interfaces),
        possible_types: names(raw.possible_types),
        enum_values: raw
            .enum_values
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.name)
            .collect(),
    })
}

fn decode_input_value(raw: RawInputValue) -> Result<InputValueDef> {
    Ok(InputValueDef {
        name: raw.name,
        description: raw.description,
        ty: TypeRef::try_from(raw.ty)?,
        default_value: raw.default_value,
    })
}

/// Text-typed field whose name looks like content.
pub fn is_searchable_field(name: &str, base_type: &str) -> bool {
    if !TEXT_SCALARS.contains(&base_type) || name.starts_with('_') {
        return false;
    }
    let lower = name.to_lowercase();
    SEARCHABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// The standard introspection query.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types { ...FullType }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args { ...InputValue }
    type { ...TypeRef }
  }
  inputFields { ...InputValue }
  interfaces { ...TypeRef }
  enumValues(includeDeprecated: true) { name }
  possibleTypes { ...TypeRef }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
        }
      }
    }
  }
}
"#;
