//! Ranking content types against a free-text hint.
//!
//! Given a hint such as `"blog"` and the available content types, the
//! matcher assigns each type an additive score and returns the best match
//! plus up to four alternatives. Scores are only compared against each
//! other; the reported confidence is `min(score, 100)%`.
//!
//! | Signal | Points |
//! |--------|--------|
//! | hint equals the type key (case-insensitive) | +100 |
//! | hint equals the display name | +90 |
//! | type key contains the hint | +50 |
//! | hint contains the type key | +40 |
//! | shared pattern keyword (per keyword hit) | +20 |
//! | context word shared with the type (per word) | +10 |

use serde::Serialize;
use std::collections::BTreeSet;

use crate::field_mapper::split_words;
use crate::schema::SchemaSnapshot;

/// Keyword groups for common kinds of content.
const TYPE_PATTERNS: &[(&str, &[&str])] = &[
    ("page", &["page", "landing", "home", "standard", "start"]),
    ("article", &["article", "blog", "news", "post", "story", "editorial"]),
    ("product", &["product", "item", "sku", "catalog", "variant"]),
    ("event", &["event", "calendar", "webinar", "meetup", "conference"]),
    ("person", &["person", "author", "profile", "team", "employee", "contact"]),
    ("media", &["image", "video", "media", "asset", "file", "document"]),
    ("block", &["block", "component", "element", "widget", "teaser", "hero"]),
    ("form", &["form", "survey", "signup", "newsletter"]),
    ("navigation", &["menu", "navigation", "nav", "footer", "header", "link"]),
];

const MAX_ALTERNATIVES: usize = 4;

/// A content type the matcher can choose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCandidate {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TypeCandidate {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: None,
            description: None,
        }
    }
}

/// A scored content type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeMatch {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub score: u32,
    /// `min(score, 100)` followed by `%`.
    pub confidence: String,
    pub reasons: Vec<String>,
}

/// Matcher output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeMatchResult {
    pub hint: String,
    pub best_match: Option<TypeMatch>,
    pub alternatives: Vec<TypeMatch>,
    /// All available types; filled only when nothing matched.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_types: Vec<String>,
}

/// Score every candidate and rank them.
///
/// Ties are broken by key so the ranking is deterministic.
pub fn match_content_type(
    hint: &str,
    context: Option<&str>,
    candidates: &[TypeCandidate],
) -> TypeMatchResult {
    let mut scored: Vec<TypeMatch> = candidates
        .iter()
        .filter_map(|c| score_type(hint, context, c))
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.key.cmp(&b.key)));

    let mut ranked = scored.into_iter();
    let best_match = ranked.next();
    let alternatives: Vec<TypeMatch> = ranked.take(MAX_ALTERNATIVES).collect();

    let available_types = if best_match.is_none() {
        let mut keys: Vec<String> = candidates.iter().map(|c| c.key.clone()).collect();
        keys.sort();
        keys
    } else {
        Vec::new()
    };

    TypeMatchResult {
        hint: hint.to_string(),
        best_match,
        alternatives,
        available_types,
    }
}

fn score_type(hint: &str, context: Option<&str>, candidate: &TypeCandidate) -> Option<TypeMatch> {
    let hint_lower = hint.trim().to_lowercase();
    if hint_lower.is_empty() {
        return None;
    }
    let key_lower = candidate.key.to_lowercase();
    let display_lower = candidate.display_name.as_deref().map(str::to_lowercase);

    let mut score = 0u32;
    let mut reasons = Vec::new();

    if key_lower == hint_lower {
        score += 100;
        reasons.push("exact key match".to_string());
    }
    if display_lower.as_deref() == Some(hint_lower.as_str()) {
        score += 90;
        reasons.push("exact display name match".to_string());
    }
    if key_lower != hint_lower {
        if key_lower.contains(&hint_lower) {
            score += 50;
            reasons.push(format!("'{}' contains '{}'", candidate.key, hint));
        } else if hint_lower.contains(&key_lower) {
            score += 40;
            reasons.push(format!("'{}' contains '{}'", hint, candidate.key));
        }
    }

    let haystack = format!(
        "{} {}",
        key_lower,
        display_lower.as_deref().unwrap_or_default()
    );
    for (group, keywords) in TYPE_PATTERNS {
        if !keywords.iter().any(|k| hint_lower.contains(k)) {
            continue;
        }
        let hits = keywords.iter().filter(|k| haystack.contains(*k)).count() as u32;
        if hits > 0 {
            score += 20 * hits;
            reasons.push(format!("{} '{}' pattern keyword(s)", hits, group));
        }
    }

    if let Some(ctx) = context {
        let ctx_words: BTreeSet<String> = split_words(ctx)
            .into_iter()
            .filter(|w| w.len() > 2)
            .collect();
        let mut type_words: BTreeSet<String> = split_words(&candidate.key).into_iter().collect();
        for text in [&candidate.display_name, &candidate.description]
            .into_iter()
            .flatten()
        {
            type_words.extend(split_words(text));
        }
        let shared = ctx_words.intersection(&type_words).count() as u32;
        if shared > 0 {
            score += 10 * shared;
            reasons.push(format!("{} context word(s) shared", shared));
        }
    }

    if score == 0 {
        return None;
    }

    Some(TypeMatch {
        key: candidate.key.clone(),
        display_name: candidate.display_name.clone(),
        score,
        confidence: format!("{}%", score.min(100)),
        reasons,
    })
}

/// Candidates from the snapshot's content types.
///
/// Introspection carries no display names, so only descriptions are set.
pub fn candidates_from_snapshot(snapshot: &SchemaSnapshot) -> Vec<TypeCandidate> {
    snapshot
        .content_types()
        .values()
        .map(|ct| TypeCandidate {
            key: ct.name.clone(),
            display_name: None,
            description: ct.description.clone(),
        })
        .collect()
}
