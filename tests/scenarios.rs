//! End-to-end behavior over an in-process client and a temp cache dir.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cms_graph_mcp::discovery::DiscoveryTarget;
use cms_graph_mcp::field_mapper::{find_best_field_match, Confidence, FieldCandidate, FieldMapper};
use cms_graph_mcp::fragment_cache::{clear_root, instance_id_for, FragmentCache};
use cms_graph_mcp::fragments::ALL_COMPONENTS;
use cms_graph_mcp::introspector::{InitState, SchemaIntrospector};
use cms_graph_mcp::query_builder::SearchParams;
use cms_graph_mcp::type_matcher::{match_content_type, TypeCandidate};
use common::*;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

#[tokio::test]
async fn test_heading_maps_to_title() {
    let client = Arc::new(MockClient::new(article_only_schema()));
    let mapper = FieldMapper::new(Arc::new(SchemaIntrospector::new(client)));

    let mut props = Map::new();
    props.insert("heading".into(), json!("X"));
    let result = mapper
        .map_fields_dynamically("ArticlePage", &props)
        .await
        .unwrap();

    let suggestion = &result.mapping_suggestions[0];
    assert_eq!(suggestion.user_field, "heading");
    assert_eq!(suggestion.suggested_field, "Title");
    assert!(matches!(
        suggestion.confidence,
        Confidence::High | Confidence::Medium
    ));
    assert_eq!(result.mapped_properties["Title"], json!("X"));
    assert!(result.unmapped_fields.is_empty());
}

#[test]
fn test_exact_match_short_circuits() {
    let candidates = vec![FieldCandidate::new("title"), FieldCandidate::new("Subtitle")];
    let m = find_best_field_match("Title", &candidates).unwrap();
    assert_eq!(m.suggested_field, "title");
    assert_eq!(m.confidence, Confidence::High);
}

#[test]
fn test_unrelated_field_has_no_match() {
    let candidates = vec![FieldCandidate::new("Title"), FieldCandidate::new("Body")];
    assert!(find_best_field_match("zzqx", &candidates).is_none());
}

#[test]
fn test_fragment_survives_restart() {
    let dir = TempDir::new().unwrap();

    let first = FragmentCache::new(dir.path(), ENDPOINT, "v1");
    assert_eq!(first.get_cached_fragment(ALL_COMPONENTS), None);
    first.set_cached_fragment(ALL_COMPONENTS, "fragment AllComponents on _IContent { __typename }", None);

    // A fresh cache has an empty memory map and must read from disk.
    let second = FragmentCache::new(dir.path(), ENDPOINT, "v1");
    assert!(second.memory_entries().is_empty());
    assert_eq!(
        second.get_cached_fragment(ALL_COMPONENTS).as_deref(),
        Some("fragment AllComponents on _IContent { __typename }")
    );

    second.invalidate_cache().unwrap();
    let third = FragmentCache::new(dir.path(), ENDPOINT, "v1");
    assert_eq!(third.get_cached_fragment(ALL_COMPONENTS), None);
}

#[test]
fn test_instances_are_partitioned() {
    let dir = TempDir::new().unwrap();
    let a = FragmentCache::new(dir.path(), ENDPOINT, "v1");
    let b = FragmentCache::new(dir.path(), ENDPOINT, "v2");
    let c = FragmentCache::new(dir.path(), "https://other.example.com/graphql", "v1");
    assert_ne!(a.instance_id(), b.instance_id());
    assert_ne!(a.instance_id(), c.instance_id());
    assert_eq!(a.instance_id(), instance_id_for(ENDPOINT, "v1"));

    a.set_cached_fragment("ArticlePageFields", "fragment A on ArticlePage { Title }", None);
    assert_eq!(b.get_cached_fragment("ArticlePageFields"), None);

    b.set_cached_fragment("ArticlePageFields", "fragment B on ArticlePage { Title }", None);
    assert_eq!(clear_root(dir.path()).unwrap(), 2);
    assert_eq!(clear_root(&dir.path().join("missing")).unwrap(), 0);
}

#[test]
fn test_blog_hint_ranks_blog_post_first() {
    let candidates = vec![TypeCandidate::new("BlogPost"), TypeCandidate::new("StandardPage")];
    let result = match_content_type("blog", None, &candidates);
    let best = result.best_match.unwrap();
    assert_eq!(best.key, "BlogPost");
    assert!(result.alternatives.iter().all(|alt| alt.score <= best.score));
}

#[tokio::test]
async fn test_concurrent_initialize_fetches_once() {
    let client = Arc::new(MockClient::new(cms_schema()).with_delay(Duration::from_millis(50)));
    let introspector = Arc::new(SchemaIntrospector::new(client.clone()));
    assert_eq!(introspector.state(), InitState::Uninitialized);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let introspector = introspector.clone();
            tokio::spawn(async move { introspector.initialize().await.map(|s| s.schema_version().to_string()) })
        })
        .collect();

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap());
    }
    versions.dedup();
    assert_eq!(versions.len(), 1);
    assert_eq!(client.introspections(), 1);
    assert_eq!(introspector.state(), InitState::Ready);
}

#[tokio::test]
async fn test_search_executes_through_client() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new(cms_schema()).with_response(json!({
        "data": { "_Content": { "items": [{ "__typename": "BlogPost", "Heading": "Hi" }], "total": 1 } }
    })));
    let services = services(client.clone(), dir.path());

    let built = services
        .builder()
        .build_search(&SearchParams {
            search_term: Some("hi".into()),
            content_types: vec!["BlogPost".into()],
            ..SearchParams::default()
        })
        .await
        .unwrap();
    let response = services.execute(&built).await.unwrap();
    assert_eq!(response["data"]["_Content"]["total"], 1);

    let sent = client.queries();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, built.query);
    assert_eq!(sent[0].1["searchTerm"], Value::String("hi".into()));
}

#[tokio::test]
async fn test_invalidate_all_forces_new_introspection() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new(cms_schema()));
    let services = services(client.clone(), dir.path());

    let fragment = services.fragments().get_fragment("BlogPostFields").await.unwrap();
    assert!(dir.path().join(&fragment.instance_id).exists());
    assert_eq!(client.introspections(), 1);

    services.invalidate_all().await.unwrap();
    assert!(!dir.path().join(&fragment.instance_id).exists());
    assert_eq!(services.introspector().state(), InitState::Uninitialized);

    let again = services.fragments().get_fragment("BlogPostFields").await.unwrap();
    assert!(!again.cached);
    assert_eq!(again.content, fragment.content);
    assert_eq!(client.introspections(), 2);
}

#[tokio::test]
async fn test_discovery_after_search_reuses_snapshot() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new(cms_schema()));
    let services = services(client.clone(), dir.path());

    services
        .builder()
        .build_search(&SearchParams {
            search_term: Some("pricing".into()),
            ..SearchParams::default()
        })
        .await
        .unwrap();
    assert_eq!(services.introspector().fetch_count(), 1);

    services
        .discovery()
        .discover(DiscoveryTarget::Types, None)
        .await
        .unwrap();
    assert_eq!(services.introspector().fetch_count(), 1);
    assert_eq!(client.introspections(), 1);
}
