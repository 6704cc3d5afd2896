//! `where` argument synthesis against a discovered where-input type.
//!
//! Every condition is resolved through the input type's fields before it is
//! emitted, so the builder never references a filter the schema lacks.
//! Conditions are combined with `_and` when the input type offers it and
//! deep-merged into one object otherwise.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::field_mapper::{find_best_field_match, Confidence, FieldCandidate};
use crate::schema::{InputValueDef, SchemaSnapshot, TypeDef};

/// Fields searched as a whole-document full-text filter.
const FULLTEXT_FIELDS: &[&str] = &["_fulltext", "_fullText", "fulltext"];

/// Operators usable for free-text search, most specific first.
const TEXT_OPERATORS: &[&str] = &["match", "contains", "like", "eq"];

/// Type filter shapes in priority order: metadata-nested, direct, typename.
const TYPE_FILTER_PATHS: &[&str] = &[
    "_metadata.types",
    "_metadata.contentType",
    "contentType",
    "ContentType",
    "_type",
    "types",
    "_typename",
    "typename",
];

/// Identifier fields tried by get-by-id, matched against the raw id string.
const ID_FIELDS: &[&str] = &["_metadata.key", "ContentLink.GuidValue", "_metadata.guid", "_id"];

/// Identifier field matched against a numeric id.
const NUMERIC_ID_FIELD: &str = "ContentLink.Id";

/// Path fields tried by get-by-path.
const PATH_FIELDS: &[&str] = &[
    "_metadata.url.default",
    "_metadata.url.hierarchical",
    "RelativePath",
    "Url",
];

const METADATA_KEY_PATH: &str = "_metadata.key";
const METADATA_LOCALE_PATH: &str = "_metadata.locale";

// ═══════════════════════════════════════════════════════════════════════
// Literals
// ═══════════════════════════════════════════════════════════════════════

/// A GraphQL input value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Object(Vec<(String, Literal)>),
    List(Vec<Literal>),
    Variable(String),
    Value(Value),
}

impl Literal {
    pub fn field(name: &str, value: Literal) -> Self {
        Literal::Object(vec![(name.to_string(), value)])
    }

    /// Nest `value` under a dot path: `"a.b"` → `{ a: { b: value } }`.
    pub fn at_path(path: &str, value: Literal) -> Self {
        path.rsplit('.')
            .fold(value, |acc, segment| Literal::field(segment, acc))
    }

    pub fn render(&self) -> String {
        match self {
            Literal::Object(entries) if entries.is_empty() => "{}".to_string(),
            Literal::Object(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.render()))
                    .collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Literal::List(items) => {
                let parts: Vec<String> = items.iter().map(Literal::render).collect();
                format!("[{}]", parts.join(", "))
            }
            Literal::Variable(name) => format!("${}", name),
            Literal::Value(v) => render_json(v),
        }
    }
}

/// Render JSON as a GraphQL input literal.
///
/// Strings use JSON escaping, which is valid GraphQL string syntax. Object
/// keys that are not GraphQL names are dropped.
fn render_json(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(render_json).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter(|(k, _)| is_valid_name(k))
                .map(|(k, v)| format!("{}: {}", k, render_json(v)))
                .collect();
            if parts.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", parts.join(", "))
            }
        }
        scalar => scalar.to_string(),
    }
}

/// `[_A-Za-z][_0-9A-Za-z]*`
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Deep-merge `from` into `into`. Keys already holding a different
/// non-object value are left alone and their paths returned.
fn merge_objects(
    into: &mut Vec<(String, Literal)>,
    from: Vec<(String, Literal)>,
    prefix: &str,
) -> Vec<String> {
    let mut conflicts = Vec::new();
    for (key, value) in from {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let Some(i) = into.iter().position(|(k, _)| *k == key) else {
            into.push((key, value));
            continue;
        };
        match (&mut into[i].1, value) {
            (Literal::Object(existing), Literal::Object(inner)) => {
                conflicts.extend(merge_objects(existing, inner, &path));
            }
            (existing, value) if *existing == value => {}
            _ => conflicts.push(path),
        }
    }
    conflicts
}

/// Combine independent conditions with an implicit AND.
///
/// Uses `_and` when the input declares it. Otherwise conditions are merged
/// into one object; a condition that would replace an earlier value at the
/// same path is skipped with a warning, since the input cannot express both.
pub(crate) fn combine(conditions: Vec<Literal>, has_and: bool) -> Option<Literal> {
    if conditions.len() <= 1 {
        return conditions.into_iter().next();
    }
    if has_and {
        return Some(Literal::field("_and", Literal::List(conditions)));
    }
    let mut merged: Vec<(String, Literal)> = Vec::new();
    for condition in conditions {
        let Literal::Object(entries) = condition else {
            continue;
        };
        let mut candidate = merged.clone();
        let conflicts = merge_objects(&mut candidate, entries, "");
        if conflicts.is_empty() {
            merged = candidate;
        } else {
            warn!(
                paths = ?conflicts,
                "Skipping where condition that conflicts with an earlier one (no _and on input)"
            );
        }
    }
    Some(Literal::Object(merged))
}

// ═══════════════════════════════════════════════════════════════════════
// Variables
// ═══════════════════════════════════════════════════════════════════════

/// Operation variables in declaration order.
#[derive(Debug, Default)]
pub(crate) struct Variables {
    defs: Vec<(String, String)>,
    values: Map<String, Value>,
}

impl Variables {
    /// Declare `$name: ty` with `value` and return a reference to it.
    ///
    /// Re-declaring a name keeps the first type and value.
    pub fn declare(&mut self, name: &str, ty: String, value: Value) -> Literal {
        if !self.values.contains_key(name) {
            self.defs.push((name.to_string(), ty));
            self.values.insert(name.to_string(), value);
        }
        Literal::Variable(name.to_string())
    }

    /// `($a: T, $b: U)`, or empty when nothing was declared.
    pub fn declarations(&self) -> String {
        if self.defs.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .defs
            .iter()
            .map(|(name, ty)| format!("${}: {}", name, ty))
            .collect();
        format!("({})", parts.join(", "))
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Where builder
// ═══════════════════════════════════════════════════════════════════════

pub(crate) struct WhereBuilder<'a> {
    snapshot: &'a SchemaSnapshot,
    input: &'a TypeDef,
    conditions: Vec<Literal>,
}

impl<'a> WhereBuilder<'a> {
    pub fn new(snapshot: &'a SchemaSnapshot, input: &'a TypeDef) -> Self {
        Self {
            snapshot,
            input,
            conditions: Vec::new(),
        }
    }

    pub fn input_name(&self) -> &str {
        &self.input.name
    }

    fn has_field(&self, name: &str) -> bool {
        self.input.input_field(name).is_some()
    }

    /// First of `preferred` offered by the filter type at `path`.
    fn operator(&self, path: &str, preferred: &[&str]) -> Option<&'a InputValueDef> {
        let filter = self.snapshot.resolve_input_path(&self.input.name, path)?;
        preferred.iter().find_map(|op| filter.input_field(op))
    }

    /// OR the alternatives when the input type allows it, else keep the first.
    fn any_of(&self, mut alternatives: Vec<Literal>) -> Option<Literal> {
        match alternatives.len() {
            0 => None,
            1 => alternatives.pop(),
            _ if self.has_field("_or") => Some(Literal::field("_or", Literal::List(alternatives))),
            _ => alternatives.into_iter().next(),
        }
    }

    /// Equality alternatives for `paths`, all bound to one variable.
    ///
    /// Paths whose `eq` operator has a different type than the first match
    /// are skipped so the variable stays well-typed.
    fn eq_alternatives(
        &self,
        vars: &mut Variables,
        paths: &[&str],
        var: &str,
        value: &Value,
    ) -> Vec<Literal> {
        let mut var_type: Option<String> = None;
        let mut out = Vec::new();
        for path in paths {
            let Some(op) = self.operator(path, &["eq"]) else {
                continue;
            };
            let ty = op.ty.to_string();
            match &var_type {
                Some(t) if *t != ty => continue,
                Some(_) => {}
                None => var_type = Some(ty.clone()),
            }
            let var_ref = vars.declare(var, ty, value.clone());
            out.push(Literal::at_path(path, Literal::field("eq", var_ref)));
        }
        out
    }

    /// Free-text condition over the full-text field and every searchable
    /// field the where-input can filter. Returns `false` when none exists.
    pub fn free_text(&mut self, vars: &mut Variables, var: &str, term: &str) -> bool {
        let paths: Vec<String> = FULLTEXT_FIELDS
            .iter()
            .map(|s| s.to_string())
            .chain(self.snapshot.searchable_fields().iter().cloned())
            .collect();

        let mut var_type: Option<String> = None;
        let mut alternatives = Vec::new();
        for path in &paths {
            let Some(op) = self.operator(path, TEXT_OPERATORS) else {
                continue;
            };
            let ty = op.ty.to_string();
            match &var_type {
                Some(t) if *t != ty => continue,
                Some(_) => {}
                None => var_type = Some(ty.clone()),
            }
            let var_ref = vars.declare(var, ty, Value::String(term.to_string()));
            alternatives.push(Literal::at_path(path, Literal::field(&op.name, var_ref)));
        }

        match self.any_of(alternatives) {
            Some(condition) => {
                self.conditions.push(condition);
                true
            }
            None => false,
        }
    }

    /// Content-type condition using the first supported filter shape.
    pub fn type_filter(&mut self, vars: &mut Variables, types: &[String]) -> bool {
        for path in TYPE_FILTER_PATHS {
            if let Some(op) = self.operator(path, &["in"]) {
                let var_ref = vars.declare("contentTypes", op.ty.to_string(), serde_json::json!(types));
                self.conditions
                    .push(Literal::at_path(path, Literal::field("in", var_ref)));
                return true;
            }
            if let [only] = types {
                if let Some(op) = self.operator(path, &["eq"]) {
                    let var_ref =
                        vars.declare("contentType", op.ty.to_string(), Value::String(only.clone()));
                    self.conditions
                        .push(Literal::at_path(path, Literal::field("eq", var_ref)));
                    return true;
                }
            }
        }
        false
    }

    pub fn locale_filter(&mut self, vars: &mut Variables, locale: &str) -> bool {
        let Some(op) = self.operator(METADATA_LOCALE_PATH, &["eq"]) else {
            return false;
        };
        let var_ref = vars.declare("locale", op.ty.to_string(), Value::String(locale.to_string()));
        self.conditions.push(Literal::at_path(
            METADATA_LOCALE_PATH,
            Literal::field("eq", var_ref),
        ));
        true
    }

    /// OR across the identifier fields the schema offers.
    pub fn id_filter(&mut self, vars: &mut Variables, id: &str) -> bool {
        let mut alternatives =
            self.eq_alternatives(vars, ID_FIELDS, "id", &Value::String(id.to_string()));
        if let Ok(numeric) = id.trim().parse::<i64>() {
            alternatives.extend(self.eq_alternatives(
                vars,
                &[NUMERIC_ID_FIELD],
                "numericId",
                &Value::from(numeric),
            ));
        }
        match self.any_of(alternatives) {
            Some(condition) => {
                self.conditions.push(condition);
                true
            }
            None => false,
        }
    }

    /// OR across the path fields, matching the path with and without a
    /// trailing slash.
    pub fn path_filter(&mut self, vars: &mut Variables, path: &str) -> bool {
        let mut alternatives =
            self.eq_alternatives(vars, PATH_FIELDS, "path", &Value::String(path.to_string()));
        if let Some(alt) = alternate_path(path) {
            alternatives.extend(self.eq_alternatives(
                vars,
                PATH_FIELDS,
                "altPath",
                &Value::String(alt),
            ));
        }
        match self.any_of(alternatives) {
            Some(condition) => {
                self.conditions.push(condition);
                true
            }
            None => false,
        }
    }

    /// Exclude the item whose key is `id`.
    pub fn exclude_id(&mut self, vars: &mut Variables, id: &str) -> bool {
        let Some(not) = self.input.input_field("_not") else {
            return false;
        };
        let Some(op) = self.operator(METADATA_KEY_PATH, &["eq"]) else {
            return false;
        };
        let var_ref = vars.declare("excludeId", op.ty.to_string(), Value::String(id.to_string()));
        let inner = Literal::at_path(METADATA_KEY_PATH, Literal::field("eq", var_ref));
        let value = if not.ty.is_list() {
            Literal::List(vec![inner])
        } else {
            inner
        };
        self.conditions.push(Literal::field("_not", value));
        true
    }

    /// Caller filters: scalar → `eq`, array → `in`, object → forwarded.
    ///
    /// Keys are resolved against the where-input, case-insensitively and
    /// then through the field mapper; unresolvable keys are dropped.
    pub fn caller_filters(&mut self, filters: &Map<String, Value>) {
        for (key, value) in filters {
            let Some(path) = self.resolve_filter_key(key) else {
                warn!(filter = %key, input = %self.input.name, "Dropping filter with no matching where field");
                continue;
            };
            let condition = match value {
                Value::Object(_) => Some(Literal::at_path(&path, Literal::Value(value.clone()))),
                Value::Array(_) => self.operator(&path, &["in"]).map(|_| {
                    Literal::at_path(&path, Literal::field("in", Literal::Value(value.clone())))
                }),
                _ => self.operator(&path, &["eq"]).map(|_| {
                    Literal::at_path(&path, Literal::field("eq", Literal::Value(value.clone())))
                }),
            };
            match condition {
                Some(c) => self.conditions.push(c),
                None => warn!(filter = %key, path = %path, "Dropping filter: operator not supported"),
            }
        }
    }

    fn resolve_filter_key(&self, key: &str) -> Option<String> {
        if key.split('.').all(is_valid_name)
            && self
                .snapshot
                .resolve_input_path(&self.input.name, key)
                .is_some()
        {
            return Some(key.to_string());
        }
        if let Some(field) = self
            .input
            .input_fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(key))
        {
            return Some(field.name.clone());
        }
        let candidates: Vec<FieldCandidate> = self
            .input
            .input_fields
            .iter()
            .filter(|f| !f.name.starts_with('_'))
            .map(|f| FieldCandidate::new(f.name.clone()))
            .collect();
        let mapping = find_best_field_match(key, &candidates)?;
        if mapping.confidence == Confidence::Low {
            return None;
        }
        debug!(filter = %key, field = %mapping.suggested_field, "Mapped filter key");
        Some(mapping.suggested_field)
    }

    /// The combined condition, or `None` when nothing was added.
    pub fn finish(self) -> Option<Literal> {
        let has_and = self.has_field("_and");
        combine(self.conditions, has_and)
    }
}

/// The same path with its trailing slash toggled.
fn alternate_path(path: &str) -> Option<String> {
    if path.len() > 1 && path.ends_with('/') {
        Some(path.trim_end_matches('/').to_string())
    } else if path.is_empty() || path == "/" {
        None
    } else {
        Some(format!("{}/", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{cms_schema, cms_schema_with_where, default_where_fields};
    use serde_json::json;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::from_introspection(&cms_schema()).unwrap()
    }

    fn builder(snapshot: &SchemaSnapshot) -> WhereBuilder<'_> {
        let input = snapshot.where_input_type("_Content").unwrap();
        WhereBuilder::new(snapshot, input)
    }

    #[test]
    fn test_at_path_and_render() {
        let lit = Literal::at_path("_metadata.key", Literal::field("eq", Literal::Variable("id".into())));
        assert_eq!(lit.render(), "{ _metadata: { key: { eq: $id } } }");
    }

    #[test]
    fn test_render_escapes_strings() {
        let lit = Literal::Value(json!("say \"hi\"\n"));
        assert_eq!(lit.render(), r#""say \"hi\"\n""#);
        let obj = Literal::Value(json!({"eq": 3, "bad key": 1}));
        assert_eq!(obj.render(), "{ eq: 3 }");
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("_metadata"));
        assert!(is_valid_name("Title2"));
        assert!(!is_valid_name("2Title"));
        assert!(!is_valid_name("a-b"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_combine_merges_without_and() {
        let a = Literal::at_path("_metadata.key", Literal::Value(json!(1)));
        let b = Literal::at_path("_metadata.locale", Literal::Value(json!(2)));
        let merged = combine(vec![a, b], false).unwrap();
        assert_eq!(merged.render(), "{ _metadata: { key: 1, locale: 2 } }");
    }

    #[test]
    fn test_combine_keeps_earlier_condition_on_conflict() {
        let a = Literal::at_path("Priority", Literal::field("eq", Literal::Value(json!(1))));
        let b = Literal::at_path("_metadata.key", Literal::Value(json!("k")));
        let c = Literal::at_path("Priority", Literal::field("eq", Literal::Value(json!(2))));
        let merged = combine(vec![a.clone(), b, c.clone()], false).unwrap();
        assert_eq!(merged.render(), "{ Priority: { eq: 1 }, _metadata: { key: \"k\" } }");

        let wrapped = combine(vec![a, c], true).unwrap();
        assert_eq!(wrapped.render(), "{ _and: [{ Priority: { eq: 1 } }, { Priority: { eq: 2 } }] }");
    }

    #[test]
    fn test_combine_identical_values_merge() {
        let a = Literal::at_path("_metadata.key", Literal::Value(json!("k")));
        let merged = combine(vec![a.clone(), a], false).unwrap();
        assert_eq!(merged.render(), "{ _metadata: { key: \"k\" } }");
    }

    #[test]
    fn test_combine_uses_and() {
        let a = Literal::field("x", Literal::Value(json!(1)));
        let b = Literal::field("y", Literal::Value(json!(2)));
        let out = combine(vec![a, b], true).unwrap();
        assert_eq!(out.render(), "{ _and: [{ x: 1 }, { y: 2 }] }");
        assert!(combine(vec![], true).is_none());
    }

    #[test]
    fn test_variables_declared_once() {
        let mut vars = Variables::default();
        vars.declare("id", "String".into(), json!("a"));
        vars.declare("id", "Int".into(), json!(1));
        assert_eq!(vars.declarations(), "($id: String)");
        assert_eq!(vars.into_values()["id"], json!("a"));
    }

    #[test]
    fn test_free_text_ors_fulltext_and_display_name() {
        let snap = snapshot();
        let mut wb = builder(&snap);
        let mut vars = Variables::default();
        assert!(wb.free_text(&mut vars, "searchTerm", "hello"));
        let rendered = wb.finish().unwrap().render();
        assert!(rendered.starts_with("{ _or: ["));
        assert!(rendered.contains("_fulltext: { match: $searchTerm }"));
        assert!(rendered.contains("_metadata: { displayName: { match: $searchTerm } }"));
        assert!(!rendered.contains("hello"));
        assert_eq!(vars.declarations(), "($searchTerm: String)");
    }

    #[test]
    fn test_type_filter_prefers_metadata_types() {
        let snap = snapshot();
        let mut wb = builder(&snap);
        let mut vars = Variables::default();
        assert!(wb.type_filter(&mut vars, &["ArticlePage".to_string()]));
        assert_eq!(
            wb.finish().unwrap().render(),
            "{ _metadata: { types: { in: $contentTypes } } }"
        );
        assert_eq!(vars.declarations(), "($contentTypes: [String])");
    }

    #[test]
    fn test_type_filter_dropped_when_no_shape() {
        let where_fields: Vec<Value> = default_where_fields()
            .into_iter()
            .filter(|f| f["name"] != "_metadata")
            .collect();
        let snap = SchemaSnapshot::from_introspection(&cms_schema_with_where(where_fields)).unwrap();
        let mut wb = builder(&snap);
        let mut vars = Variables::default();
        assert!(!wb.type_filter(&mut vars, &["ArticlePage".to_string()]));
        assert!(wb.finish().is_none());
        assert_eq!(vars.declarations(), "");
    }

    #[test]
    fn test_id_filter_numeric_adds_content_link() {
        let snap = snapshot();
        let mut wb = builder(&snap);
        let mut vars = Variables::default();
        assert!(wb.id_filter(&mut vars, "42"));
        let rendered = wb.finish().unwrap().render();
        assert!(rendered.contains("_metadata: { key: { eq: $id } }"));
        assert!(rendered.contains("ContentLink: { GuidValue: { eq: $id } }"));
        assert!(rendered.contains("ContentLink: { Id: { eq: $numericId } }"));
        assert_eq!(vars.declarations(), "($id: String, $numericId: Int)");
    }

    #[test]
    fn test_id_filter_guid_skips_numeric() {
        let snap = snapshot();
        let mut wb = builder(&snap);
        let mut vars = Variables::default();
        assert!(wb.id_filter(&mut vars, "a1b2c3"));
        assert!(!wb.finish().unwrap().render().contains("numericId"));
    }

    #[test]
    fn test_path_filter_toggles_slash() {
        let snap = snapshot();
        let mut wb = builder(&snap);
        let mut vars = Variables::default();
        assert!(wb.path_filter(&mut vars, "/en/news/"));
        let values = vars.into_values();
        assert_eq!(values["path"], json!("/en/news/"));
        assert_eq!(values["altPath"], json!("/en/news"));
        assert_eq!(alternate_path("/"), None);
        assert_eq!(alternate_path("/a"), Some("/a/".to_string()));
    }

    #[test]
    fn test_caller_filters() {
        let snap = snapshot();
        let mut wb = builder(&snap);
        let filters = json!({
            "category": "news",
            "Priority": [1, 2],
            "ContentLink": { "Id": { "gt": 10 } },
            "nonsense_xyz": 1
        });
        wb.caller_filters(filters.as_object().unwrap());
        let rendered = wb.finish().unwrap().render();
        assert!(rendered.contains(r#"{ Category: { eq: "news" } }"#));
        assert!(rendered.contains("{ Priority: { in: [1, 2] } }"));
        assert!(rendered.contains("{ ContentLink: { Id: { gt: 10 } } }"));
        assert!(!rendered.contains("nonsense"));
    }

    #[test]
    fn test_exclude_id() {
        let snap = snapshot();
        let mut wb = builder(&snap);
        let mut vars = Variables::default();
        assert!(wb.exclude_id(&mut vars, "abc"));
        assert_eq!(
            wb.finish().unwrap().render(),
            "{ _not: [{ _metadata: { key: { eq: $excludeId } } }] }"
        );
    }
}
