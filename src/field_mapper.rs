//! Fuzzy mapping of caller field names onto schema fields.
//!
//! Callers (usually an LLM) name fields informally: `heading`, `body_text`,
//! `authorName`. The CMS has its own names: `Title`, `MainBody`,
//! `Author.Name`. [`find_best_field_match`] scores every candidate and
//! returns the best one above a confidence floor.
//!
//! # Scoring
//!
//! 1. Case-insensitive exact match → confidence `high`, no scoring.
//! 2. Otherwise, additive score capped at 1.0:
//!    - `+0.5` one name contains the other (case and separators ignored)
//!    - `+0.4 × |shared words| / max(|user words|, |candidate words|)`
//!    - `+0.3` both names fall into the same pattern bucket
//!    - `+0.2` the candidate's display name contains, or is contained by,
//!      the user field
//! 3. Best score ≤ 0.3 → no mapping.
//! 4. Banding: > 0.8 high, > 0.5 medium, otherwise low.
//!
//! Words are split on camelCase, PascalCase, snake_case, kebab-case and dot
//! boundaries. Before the overlap is computed each word is replaced by its
//! bucket name when it is a known synonym, so `heading` and `Title` share
//! the word `title`.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::introspector::SchemaIntrospector;
use crate::schema::{SchemaSnapshot, TypeKind};

/// Semantic buckets: canonical name → synonyms (canonical included).
pub const PATTERN_BUCKETS: &[(&str, &[&str])] = &[
    (
        "title",
        &["title", "heading", "headline", "header", "name", "subject", "caption"],
    ),
    (
        "content",
        &["content", "body", "text", "main", "richtext", "copy", "html"],
    ),
    (
        "summary",
        &[
            "summary",
            "description",
            "excerpt",
            "teaser",
            "intro",
            "abstract",
            "lead",
            "preamble",
        ],
    ),
    (
        "author",
        &["author", "writer", "creator", "byline", "owner", "by"],
    ),
    (
        "date",
        &[
            "date",
            "published",
            "created",
            "modified",
            "updated",
            "time",
            "timestamp",
        ],
    ),
    (
        "image",
        &[
            "image",
            "photo",
            "picture",
            "thumbnail",
            "media",
            "img",
            "hero",
            "banner",
        ],
    ),
    (
        "meta",
        &["meta", "metadata", "seo", "canonical", "robots"],
    ),
    (
        "tags",
        &[
            "tags",
            "tag",
            "categories",
            "category",
            "labels",
            "topics",
            "keywords",
        ],
    ),
];

const SUBSTRING_WEIGHT: f64 = 0.5;
const WORD_OVERLAP_WEIGHT: f64 = 0.4;
const PATTERN_WEIGHT: f64 = 0.3;
const DISPLAY_NAME_WEIGHT: f64 = 0.2;
const MIN_SCORE: f64 = 0.3;

/// Confidence band of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            Confidence::High
        } else if score > 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// A suggested mapping from a caller field to a schema field path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMapping {
    pub user_field: String,
    /// Schema field, dot-separated for nested fields.
    pub suggested_field: String,
    pub confidence: Confidence,
    pub score: f64,
    pub reason: String,
}

/// A schema field the mapper may choose.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCandidate {
    /// Field path, dot-separated for nested fields.
    pub path: String,
    /// Human-readable name, when the schema provides one.
    pub display_name: Option<String>,
}

impl FieldCandidate {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: None,
        }
    }
}

/// A caller key dropped because its target was already written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    pub user_field: String,
    /// Path the key would have written.
    pub target_field: String,
}

/// Output of [`map_fields`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMappingResult {
    /// Properties keyed by schema field; nested fields as objects.
    pub mapped_properties: Map<String, Value>,
    /// Keys passed through without a confident match.
    pub unmapped_fields: Vec<String>,
    pub mapping_suggestions: Vec<FieldMapping>,
    /// Keys whose value was not written; the first writer keeps the slot.
    pub conflicts: Vec<FieldConflict>,
}

/// Pick the candidate that best matches `user_field`.
///
/// Returns `None` when nothing scores above 0.3.
pub fn find_best_field_match(
    user_field: &str,
    candidates: &[FieldCandidate],
) -> Option<FieldMapping> {
    let user_lower = user_field.to_lowercase();

    if let Some(exact) = candidates
        .iter()
        .find(|c| c.path.to_lowercase() == user_lower)
    {
        return Some(FieldMapping {
            user_field: user_field.to_string(),
            suggested_field: exact.path.clone(),
            confidence: Confidence::High,
            score: 1.0,
            reason: "case-insensitive exact match".to_string(),
        });
    }

    let mut best: Option<(f64, &FieldCandidate, Vec<String>)> = None;
    for candidate in candidates {
        let (score, reasons) = score_candidate(user_field, candidate);
        let better = match &best {
            Some((best_score, _, _)) => score > *best_score,
            None => true,
        };
        if better {
            best = Some((score, candidate, reasons));
        }
    }

    // Rank on the raw sum so ties at the cap still favour the closer name.
    let (raw, candidate, reasons) = best?;
    let score = f64::min(raw, 1.0);
    if score <= MIN_SCORE {
        return None;
    }

    Some(FieldMapping {
        user_field: user_field.to_string(),
        suggested_field: candidate.path.clone(),
        confidence: Confidence::from_score(score),
        score,
        reason: reasons.join(", "),
    })
}

fn score_candidate(user_field: &str, candidate: &FieldCandidate) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    let user_compact = compact(user_field);
    let cand_compact = compact(&candidate.path);
    if !user_compact.is_empty()
        && !cand_compact.is_empty()
        && (user_compact.contains(&cand_compact) || cand_compact.contains(&user_compact))
    {
        score += SUBSTRING_WEIGHT;
        reasons.push("name containment".to_string());
    }

    let user_words = canonical_words(user_field);
    let cand_words = canonical_words(&candidate.path);
    let denom = user_words.len().max(cand_words.len());
    if denom > 0 {
        let shared = user_words.intersection(&cand_words).count();
        if shared > 0 {
            score += shared as f64 / denom as f64 * WORD_OVERLAP_WEIGHT;
            reasons.push(format!("{}/{} shared words", shared, denom));
        }
    }

    let user_buckets = buckets_for(user_field);
    let cand_buckets = buckets_for(&candidate.path);
    if let Some(bucket) = user_buckets.intersection(&cand_buckets).next() {
        score += PATTERN_WEIGHT;
        reasons.push(format!("shared '{}' pattern", bucket));
    }

    if let Some(display) = &candidate.display_name {
        let display_lower = display.to_lowercase();
        let user_lower = user_field.to_lowercase();
        if !display_lower.is_empty()
            && (display_lower.contains(&user_lower) || user_lower.contains(&display_lower))
        {
            score += DISPLAY_NAME_WEIGHT;
            reasons.push("display name match".to_string());
        }
    }

    (score, reasons)
}

/// Lowercase alphanumerics only.
fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Split an identifier into lowercase words.
///
/// Handles `camelCase`, `PascalCase`, `snake_case`, `kebab-case`, dotted
/// paths and acronyms (`HTMLTitle` → `html`, `title`).
pub fn split_words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }

        current.extend(c.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn canonical_words(s: &str) -> BTreeSet<String> {
    split_words(s)
        .into_iter()
        .map(|w| canonical_word(&w).map(|b| b.to_string()).unwrap_or(w))
        .collect()
}

/// Bucket whose synonym list contains `word` exactly.
fn canonical_word(word: &str) -> Option<&'static str> {
    PATTERN_BUCKETS
        .iter()
        .find(|(_, synonyms)| synonyms.contains(&word))
        .map(|(bucket, _)| *bucket)
}

/// Buckets a name belongs to.
///
/// A name belongs to a bucket when one of its words is a synonym, or when
/// its compacted form contains a synonym of four or more letters.
pub fn buckets_for(name: &str) -> BTreeSet<&'static str> {
    let words = split_words(name);
    let compacted = compact(name);
    PATTERN_BUCKETS
        .iter()
        .filter(|(_, synonyms)| {
            synonyms.iter().any(|syn| {
                words.iter().any(|w| w == syn) || (syn.len() >= 4 && compacted.contains(syn))
            })
        })
        .map(|(bucket, _)| *bucket)
        .collect()
}

/// Map caller properties onto schema fields.
///
/// - A key equal to a candidate path is kept as-is.
/// - Otherwise the best match is applied when its confidence is not `low`;
///   dotted targets are written as nested objects.
/// - Keys without an applicable match pass through unchanged and are listed
///   in `unmapped_fields`.
///
/// Exact keys are written first, then matched keys, then pass-through keys.
/// A key whose target is already taken is reported in `conflicts` and its
/// value is dropped.
pub fn map_fields(candidates: &[FieldCandidate], props: &Map<String, Value>) -> FieldMappingResult {
    let mut mapped = Map::new();
    let mut unmapped = Vec::new();
    let mut suggestions = Vec::new();
    let mut conflicts = Vec::new();

    let mut matched = Vec::new();
    let mut passthrough = Vec::new();
    let mut writes = Vec::new();
    for (key, value) in props {
        if candidates.iter().any(|c| &c.path == key) {
            writes.push((key.clone(), key.clone(), value));
            continue;
        }
        match find_best_field_match(key, candidates) {
            Some(mapping) if mapping.confidence != Confidence::Low => {
                matched.push((key.clone(), mapping.suggested_field.clone(), value));
                suggestions.push(mapping);
            }
            other => {
                passthrough.push((key.clone(), key.clone(), value));
                if let Some(low) = other {
                    suggestions.push(low);
                }
            }
        }
    }
    writes.extend(matched);
    let first_passthrough = writes.len();
    writes.extend(passthrough);

    for (i, (key, target, value)) in writes.into_iter().enumerate() {
        if is_occupied(&mapped, &target) {
            conflicts.push(FieldConflict {
                user_field: key,
                target_field: target,
            });
            continue;
        }
        set_by_path(&mut mapped, &target, value.clone());
        if i >= first_passthrough {
            unmapped.push(key);
        }
    }

    FieldMappingResult {
        mapped_properties: mapped,
        unmapped_fields: unmapped,
        mapping_suggestions: suggestions,
        conflicts,
    }
}

/// Whether writing `path` would replace a value already in `target`.
fn is_occupied(target: &Map<String, Value>, path: &str) -> bool {
    let mut segments = path.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        let Some(slot) = current.get(segment) else {
            return false;
        };
        if segments.peek().is_none() {
            return true;
        }
        match slot {
            Value::Object(map) => current = map,
            _ => return true,
        }
    }
    false
}

/// Assign `value` at a dot path, creating intermediate objects.
pub fn set_by_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
}

/// Candidate paths for a content type: its own fields plus one level of
/// nested object fields (`Author.Name`). System fields (`_`-prefixed) are
/// skipped.
pub fn candidates_for_type(snapshot: &SchemaSnapshot, content_type: &str) -> Vec<FieldCandidate> {
    let mut out = Vec::new();
    let Some(def) = snapshot.get_type(content_type) else {
        return out;
    };

    for field in &def.fields {
        if field.name.starts_with('_') {
            continue;
        }
        out.push(FieldCandidate {
            path: field.name.clone(),
            display_name: field.description.clone(),
        });

        let Some(child_type) = snapshot.get_type(field.ty.base_name()) else {
            continue;
        };
        if !matches!(child_type.kind, TypeKind::Object | TypeKind::Interface) {
            continue;
        }
        for child in &child_type.fields {
            if child.name.starts_with('_') {
                continue;
            }
            out.push(FieldCandidate {
                path: format!("{}.{}", field.name, child.name),
                display_name: child.description.clone(),
            });
        }
    }
    out
}

/// Schema-aware field mapper.
pub struct FieldMapper {
    introspector: Arc<SchemaIntrospector>,
}

impl FieldMapper {
    pub fn new(introspector: Arc<SchemaIntrospector>) -> Self {
        Self { introspector }
    }

    /// Map caller properties onto the fields of `content_type`.
    ///
    /// An unknown content type has no candidates, so every property comes
    /// back unmapped.
    pub async fn map_fields_dynamically(
        &self,
        content_type: &str,
        props: &Map<String, Value>,
    ) -> Result<FieldMappingResult> {
        let snapshot = self.introspector.initialize().await?;
        let candidates = candidates_for_type(&snapshot, content_type);
        Ok(map_fields(&candidates, props))
    }

    /// Best match for a single field of `content_type`.
    pub async fn suggest(&self, content_type: &str, user_field: &str) -> Result<Option<FieldMapping>> {
        let snapshot = self.introspector.initialize().await?;
        Ok(find_best_field_match(
            user_field,
            &candidates_for_type(&snapshot, content_type),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::cms_schema;
    use serde_json::json;

    fn cands(names: &[&str]) -> Vec<FieldCandidate> {
        names.iter().map(|n| FieldCandidate::new(*n)).collect()
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("mainBody"), vec!["main", "body"]);
        assert_eq!(split_words("MainBody"), vec!["main", "body"]);
        assert_eq!(split_words("main_body"), vec!["main", "body"]);
        assert_eq!(split_words("main-body"), vec!["main", "body"]);
        assert_eq!(split_words("Author.Name"), vec!["author", "name"]);
        assert_eq!(split_words("HTMLTitle"), vec!["html", "title"]);
        assert_eq!(split_words("seo2Title"), vec!["seo2", "title"]);
    }

    #[test]
    fn test_exact_match_short_circuits() {
        let m = find_best_field_match("Title", &cands(&["title", "Body"])).unwrap();
        assert_eq!(m.suggested_field, "title");
        assert_eq!(m.confidence, Confidence::High);
        assert_eq!(m.reason, "case-insensitive exact match");
    }

    #[test]
    fn test_no_match_below_threshold() {
        assert!(find_best_field_match("zzqx", &cands(&["Title", "Body", "Priority"])).is_none());
        assert!(find_best_field_match("anything", &[]).is_none());
    }

    #[test]
    fn test_heading_maps_to_title() {
        let m = find_best_field_match("heading", &cands(&["Title", "Body"])).unwrap();
        assert_eq!(m.suggested_field, "Title");
        assert!(matches!(m.confidence, Confidence::Medium | Confidence::High));
        assert!(m.reason.contains("title"));
    }

    #[test]
    fn test_substring_and_words() {
        let m = find_best_field_match("body", &cands(&["MainBody", "Title"])).unwrap();
        assert_eq!(m.suggested_field, "MainBody");
        assert!(m.score > 0.8);
    }

    #[test]
    fn test_display_name_bonus() {
        let plain = FieldCandidate::new("Fld1");
        let with_display = FieldCandidate {
            path: "Fld1".into(),
            display_name: Some("Page heading".into()),
        };
        let (without, _) = score_candidate("heading", &plain);
        let (with, reasons) = score_candidate("heading", &with_display);
        assert!((with - without - 0.2).abs() < 1e-9);
        assert!(reasons.contains(&"display name match".to_string()));
    }

    #[test]
    fn test_score_capped() {
        let m = find_best_field_match("mainbodytext", &cands(&["MainBodyText2"])).unwrap();
        assert!(m.score <= 1.0);
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(Confidence::from_score(0.81), Confidence::High);
        assert_eq!(Confidence::from_score(0.8), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.51), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.5), Confidence::Low);
    }

    #[test]
    fn test_set_by_path_creates_objects() {
        let mut m = Map::new();
        set_by_path(&mut m, "Author.Address.City", json!("Oslo"));
        set_by_path(&mut m, "Author.Name", json!("Ada"));
        assert_eq!(
            Value::Object(m),
            json!({ "Author": { "Address": { "City": "Oslo" }, "Name": "Ada" } })
        );
    }

    #[test]
    fn test_map_fields_passes_unmapped_through() {
        let candidates = cands(&["Title", "MainBody"]);
        let props = json!({ "headline": "b", "zzqx": 1 });
        let result = map_fields(&candidates, props.as_object().unwrap());
        assert_eq!(result.mapped_properties["Title"], json!("b"));
        assert_eq!(result.mapped_properties["zzqx"], json!(1));
        assert_eq!(result.unmapped_fields, vec!["zzqx".to_string()]);
        assert_eq!(result.mapping_suggestions.len(), 1);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_exact_key_wins_over_matched_key() {
        let candidates = cands(&["Title", "MainBody"]);
        let props = json!({ "Title": "a", "heading": "b" });
        let result = map_fields(&candidates, props.as_object().unwrap());
        assert_eq!(result.mapped_properties["Title"], json!("a"));
        assert_eq!(
            result.conflicts,
            vec![FieldConflict {
                user_field: "heading".into(),
                target_field: "Title".into(),
            }]
        );
        assert!(result.unmapped_fields.is_empty());
    }

    #[test]
    fn test_two_keys_for_one_field_conflict() {
        let candidates = cands(&["Title", "MainBody"]);
        let props = json!({ "heading": "a", "headline": "b", "zzqx": 1 });
        let result = map_fields(&candidates, props.as_object().unwrap());
        assert_eq!(result.mapped_properties["Title"], json!("a"));
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].user_field, "headline");
        assert_eq!(result.unmapped_fields, vec!["zzqx".to_string()]);
    }

    #[test]
    fn test_is_occupied_walks_paths() {
        let m = json!({ "Author": { "Name": "Ada" }, "Title": "t" });
        let m = m.as_object().unwrap();
        assert!(is_occupied(m, "Author.Name"));
        assert!(is_occupied(m, "Author"));
        assert!(is_occupied(m, "Title.Sub"));
        assert!(!is_occupied(m, "Author.Email"));
        assert!(!is_occupied(m, "Body"));
    }

    #[test]
    fn test_candidates_include_nested_paths() {
        let snapshot =
            crate::schema::SchemaSnapshot::from_introspection(&cms_schema()).unwrap();
        let c = candidates_for_type(&snapshot, "ArticlePage");
        let paths: Vec<&str> = c.iter().map(|c| c.path.as_str()).collect();
        assert!(paths.contains(&"Title"));
        assert!(paths.contains(&"Author.Name"));
        assert!(!paths.iter().any(|p| p.starts_with('_')));
        assert!(candidates_for_type(&snapshot, "Missing").is_empty());
    }

    #[test]
    fn test_nested_mapping_written_with_dots() {
        let snapshot =
            crate::schema::SchemaSnapshot::from_introspection(&cms_schema()).unwrap();
        let candidates = candidates_for_type(&snapshot, "ArticlePage");
        let props = json!({ "author_email": "ada@example.com" });
        let result = map_fields(&candidates, props.as_object().unwrap());
        assert_eq!(
            result.mapped_properties["Author"]["Email"],
            json!("ada@example.com")
        );
        assert!(result.unmapped_fields.is_empty());
    }
}
