//! Field selection rendering.
//!
//! Selections are emitted line by line at two spaces per indent level.
//! Object and interface fields recurse until `max_depth` (clamped to
//! `max_depth_limit`) and never into a type already on the current path;
//! fields whose rendered selection would be empty are left out so every
//! `{ }` block has at least one field.

use tracing::debug;

use super::QueryBuilderOptions;
use crate::schema::{SchemaSnapshot, TypeDef, TypeKind, METADATA_FIELD};

/// Depth of the metadata block, independent of `max_depth`.
const METADATA_DEPTH: usize = 2;

pub(crate) fn line(indent: usize, text: &str) -> String {
    format!("{}{}", "  ".repeat(indent), text)
}

pub(crate) struct SelectionRenderer<'a> {
    snapshot: &'a SchemaSnapshot,
    options: &'a QueryBuilderOptions,
}

impl<'a> SelectionRenderer<'a> {
    pub fn new(snapshot: &'a SchemaSnapshot, options: &'a QueryBuilderOptions) -> Self {
        Self { snapshot, options }
    }

    /// `items { __typename _metadata { … } ... on T { … } }`
    ///
    /// Types that do not implement `item_type` are skipped; an inline
    /// fragment on them would not validate.
    pub fn push_items(&self, item_type: &str, types: &[String], indent: usize, out: &mut Vec<String>) {
        out.push(line(indent, "items {"));
        out.push(line(indent + 1, "__typename"));
        if let Some(def) = self.snapshot.get_type(item_type) {
            self.push_metadata(def, indent + 1, out);
        }
        for type_name in types {
            if !self.snapshot.implements(type_name, item_type) {
                debug!(type_name = %type_name, item_type, "Skipping fragment for non-implementing type");
                continue;
            }
            self.push_inline_fragment(type_name, indent + 1, out);
        }
        out.push(line(indent, "}"));
    }

    /// `... on T { … }`
    pub fn push_inline_fragment(&self, type_name: &str, indent: usize, out: &mut Vec<String>) {
        out.push(line(indent, &format!("... on {} {{", type_name)));
        self.push_type_body(type_name, indent + 1, out);
        out.push(line(indent, "}"));
    }

    /// The fields of a content type, falling back to `__typename`.
    pub fn push_type_body(&self, type_name: &str, indent: usize, out: &mut Vec<String>) {
        let mut body = Vec::new();
        if let Some(def) = self.snapshot.get_type(type_name) {
            let mut path = vec![def.name.as_str()];
            self.push_fields(def, 1, self.max_depth(), true, indent, &mut path, &mut body);
        }
        if body.is_empty() {
            body.push(line(indent, "__typename"));
        }
        out.extend(body);
    }

    /// The `_metadata { … }` block of `owner`, when enabled and present.
    pub fn push_metadata(&self, owner: &TypeDef, indent: usize, out: &mut Vec<String>) -> bool {
        if !self.options.include_metadata {
            return false;
        }
        let Some(field) = owner.field(METADATA_FIELD) else {
            return false;
        };
        let Some(target) = self.snapshot.get_type(field.ty.base_name()) else {
            return false;
        };
        let mut nested = Vec::new();
        let mut path = vec![target.name.as_str()];
        if self.push_fields(target, 1, METADATA_DEPTH, false, indent + 1, &mut path, &mut nested) == 0 {
            return false;
        }
        out.push(line(indent, &format!("{} {{", METADATA_FIELD)));
        out.extend(nested);
        out.push(line(indent, "}"));
        true
    }

    fn max_depth(&self) -> usize {
        self.options.max_depth.clamp(1, self.options.max_depth_limit.max(1))
    }

    /// Top-level include/exclude lists.
    fn wanted(&self, name: &str) -> bool {
        if let Some(include) = &self.options.include_fields {
            if !include.is_empty() && !include.iter().any(|f| f == name) {
                return false;
            }
        }
        if let Some(exclude) = &self.options.exclude_fields {
            if exclude.iter().any(|f| f == name) {
                return false;
            }
        }
        true
    }

    /// Push the selectable fields of `def`; returns how many were pushed.
    ///
    /// `path` holds the object types between the root and `def`.
    #[allow(clippy::too_many_arguments)]
    fn push_fields(
        &self,
        def: &TypeDef,
        depth: usize,
        max_depth: usize,
        top_level: bool,
        indent: usize,
        path: &mut Vec<&'a str>,
        out: &mut Vec<String>,
    ) -> usize {
        let mut count = 0;
        for field in &def.fields {
            if field.name.starts_with('_') || field.has_required_args() {
                continue;
            }
            if top_level && !self.wanted(&field.name) {
                continue;
            }
            let Some(target) = self.snapshot.get_type(field.ty.base_name()) else {
                continue;
            };
            match target.kind {
                TypeKind::Scalar | TypeKind::Enum => {
                    out.push(line(indent, &field.name));
                    count += 1;
                }
                TypeKind::Object | TypeKind::Interface => {
                    if depth >= max_depth || path.contains(&target.name.as_str()) {
                        continue;
                    }
                    let mut nested = Vec::new();
                    path.push(target.name.as_str());
                    let pushed =
                        self.push_fields(target, depth + 1, max_depth, false, indent + 1, path, &mut nested);
                    path.pop();
                    if pushed == 0 {
                        continue;
                    }
                    out.push(line(indent, &format!("{} {{", field.name)));
                    out.extend(nested);
                    out.push(line(indent, "}"));
                    count += 1;
                }
                TypeKind::Union => {
                    out.push(line(indent, &format!("{} {{ __typename }}", field.name)));
                    count += 1;
                }
                _ => {}
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{cms_schema, recursive_schema};

    fn render(options: &QueryBuilderOptions, types: &[&str]) -> String {
        let snap = SchemaSnapshot::from_introspection(&cms_schema()).unwrap();
        let renderer = SelectionRenderer::new(&snap, options);
        let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
        let mut out = Vec::new();
        renderer.push_items("_IContent", &types, 0, &mut out);
        out.join("\n")
    }

    #[test]
    fn test_metadata_block_and_fragment() {
        let text = render(&QueryBuilderOptions::default(), &["ArticlePage"]);
        assert!(text.contains("  _metadata {\n    key\n    displayName"));
        assert!(text.contains("    url {\n      default\n      hierarchical\n    }"));
        assert!(text.contains("  ... on ArticlePage {\n    Title\n    Body\n"));
        assert!(!text.contains("_id"));
    }

    #[test]
    fn test_depth_limit() {
        let text = render(&QueryBuilderOptions::default(), &["ArticlePage"]);
        assert!(text.contains("Author {\n      Name\n      Email\n    }"));
        assert!(!text.contains("Address"));

        let shallow = QueryBuilderOptions {
            max_depth: 1,
            ..QueryBuilderOptions::default()
        };
        let text = render(&shallow, &["ArticlePage"]);
        assert!(!text.contains("Author"));
        assert!(text.contains("Priority"));

        let deep = QueryBuilderOptions {
            max_depth: 3,
            ..QueryBuilderOptions::default()
        };
        assert!(render(&deep, &["ArticlePage"]).contains("Address {\n        City"));
    }

    #[test]
    fn test_include_exclude() {
        let opts = QueryBuilderOptions {
            include_fields: Some(vec!["Title".into(), "Body".into()]),
            exclude_fields: Some(vec!["Body".into()]),
            ..QueryBuilderOptions::default()
        };
        let text = render(&opts, &["ArticlePage"]);
        assert!(text.contains("Title"));
        assert!(!text.contains("Body"));
        assert!(!text.contains("Priority"));
    }

    #[test]
    fn test_metadata_disabled() {
        let opts = QueryBuilderOptions {
            include_metadata: false,
            ..QueryBuilderOptions::default()
        };
        let text = render(&opts, &["BlogPost"]);
        assert!(!text.contains("_metadata"));
        assert!(text.contains("... on BlogPost {\n    Heading\n    Teaser\n  }"));
    }

    #[test]
    fn test_skips_non_implementing_types() {
        let text = render(&QueryBuilderOptions::default(), &["Person", "BlogPost"]);
        assert!(!text.contains("on Person"));
        assert!(text.contains("on BlogPost"));
    }

    #[test]
    fn test_recursive_type_stops_at_cycle() {
        let snap = SchemaSnapshot::from_introspection(&recursive_schema()).unwrap();
        let options = QueryBuilderOptions {
            max_depth: 50,
            max_depth_limit: 50,
            ..QueryBuilderOptions::default()
        };
        let mut out = Vec::new();
        SelectionRenderer::new(&snap, &options).push_type_body("TreePage", 0, &mut out);
        let text = out.join("\n");
        assert_eq!(text, "Name\nRoot {\n  Name\n}");
    }

    #[test]
    fn test_depth_clamped_to_limit() {
        let options = QueryBuilderOptions {
            max_depth: 3,
            max_depth_limit: 2,
            ..QueryBuilderOptions::default()
        };
        let text = render(&options, &["ArticlePage"]);
        assert!(text.contains("Author {"));
        assert!(!text.contains("Address"));
    }
}
