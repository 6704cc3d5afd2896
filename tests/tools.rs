//! Tool dispatch through the registry, as the MCP bridge does it.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use cms_graph_mcp::services::CmsServices;
use cms_graph_mcp::tools::{validate_params, ToolContext, ToolRegistry};
use common::*;

async fn call(services: &Arc<CmsServices>, name: &str, params: Value) -> anyhow::Result<Value> {
    let registry = ToolRegistry::with_builtins();
    let tool = registry.find(name).expect("tool registered");
    let params = validate_params(&tool.parameters_schema(), &params)?;
    tool.execute(params, &ToolContext::new(services.clone())).await
}

fn setup(dir: &TempDir) -> (Arc<MockClient>, Arc<CmsServices>) {
    let client = Arc::new(MockClient::new(cms_schema()));
    let services = services(client.clone(), dir.path());
    (client, services)
}

#[tokio::test]
async fn test_discover_schema_defaults_to_types() {
    let dir = TempDir::new().unwrap();
    let (_, services) = setup(&dir);

    let first = call(&services, "discover_schema", json!({})).await.unwrap();
    assert_eq!(first["target"], "types");
    assert_eq!(first["cached"], false);
    let names: Vec<&str> = first["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["ArticlePage", "BlogPost", "HeroBlock", "StandardPage"]);

    let second = call(&services, "discover_schema", json!({ "target": "types" }))
        .await
        .unwrap();
    assert_eq!(second["cached"], true);

    let err = call(&services, "discover_schema", json!({ "target": "fields" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("content_type is required"));
}

#[tokio::test]
async fn test_search_executes_by_default() {
    let dir = TempDir::new().unwrap();
    let (client, services) = setup(&dir);

    let result = call(&services, "search_content", json!({ "search_term": "pricing" }))
        .await
        .unwrap();
    assert_eq!(result["data"]["_Content"]["total"], 0);
    assert_eq!(client.queries().len(), 1);
}

#[tokio::test]
async fn test_selection_overrides_apply() {
    let dir = TempDir::new().unwrap();
    let (_, services) = setup(&dir);

    let result = call(
        &services,
        "get_content",
        json!({
            "id": "abc",
            "content_types": ["ArticlePage"],
            "exclude_fields": ["Body"],
            "max_depth": 1,
            "execute": false
        }),
    )
    .await
    .unwrap();
    let query = result["query"].as_str().unwrap();
    assert_parses(query);
    assert!(query.contains("Title"));
    assert!(!query.contains("Body"));
    assert!(!query.contains("Author"));
}

#[tokio::test]
async fn test_faceted_and_related_build() {
    let dir = TempDir::new().unwrap();
    let (_, services) = setup(&dir);

    let faceted = call(
        &services,
        "faceted_search",
        json!({
            "search_term": "news",
            "facets": { "types": { "field": "_metadata.types", "limit": 5 } },
            "execute": false
        }),
    )
    .await
    .unwrap();
    let query = faceted["query"].as_str().unwrap();
    assert_parses(query);
    assert!(query.contains("types(limit: 5)"));

    let related = call(
        &services,
        "related_content",
        json!({ "id": "abc", "terms": ["pricing", "plans"], "execute": false }),
    )
    .await
    .unwrap();
    assert_parses(related["query"].as_str().unwrap());
    assert_eq!(related["variables"]["relatedTerms"], "pricing plans");

    let err = call(&services, "faceted_search", json!({ "search_term": "x" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing required parameter: facets"));
}

#[tokio::test]
async fn test_map_and_match() {
    let dir = TempDir::new().unwrap();
    let (_, services) = setup(&dir);

    let mapped = call(
        &services,
        "map_fields",
        json!({ "content_type": "BlogPost", "properties": { "headline": "Hi", "zzqx": 1 } }),
    )
    .await
    .unwrap();
    assert_eq!(mapped["mapped_properties"]["Heading"], "Hi");
    assert_eq!(mapped["unmapped_fields"], json!(["zzqx"]));
    assert_eq!(mapped["conflicts"], json!([]));

    let clashing = call(
        &services,
        "map_fields",
        json!({ "content_type": "BlogPost", "properties": { "heading": "A", "headline": "B" } }),
    )
    .await
    .unwrap();
    assert_eq!(clashing["mapped_properties"]["Heading"], "A");
    assert_eq!(
        clashing["conflicts"],
        json!([{ "user_field": "headline", "target_field": "Heading" }])
    );

    let matched = call(&services, "match_content_type", json!({ "hint": "blog" }))
        .await
        .unwrap();
    assert_eq!(matched["best_match"]["key"], "BlogPost");

    let err = call(&services, "match_content_type", json!({ "hint": "  " }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must not be empty"));
}

#[tokio::test]
async fn test_fragments_and_invalidation() {
    let dir = TempDir::new().unwrap();
    let (client, services) = setup(&dir);

    let available = call(&services, "get_fragment", json!({})).await.unwrap();
    assert_eq!(available["available"][0], "AllComponents");

    let fragment = call(&services, "get_fragment", json!({ "name": "AllComponents" }))
        .await
        .unwrap();
    let content = fragment["content"].as_str().unwrap();
    assert!(content.contains("... on HeroBlock"));
    assert_parses(content);

    // A stray instance from another endpoint.
    std::fs::create_dir_all(dir.path().join("0123456789ab")).unwrap();

    let result = call(&services, "invalidate_cache", json!({ "all_instances": true }))
        .await
        .unwrap();
    assert_eq!(result["invalidated"], true);
    assert_eq!(result["removed_instances"], 1);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());

    call(&services, "discover_schema", json!({})).await.unwrap();
    assert_eq!(client.introspections(), 2);
}

#[tokio::test]
async fn test_max_depth_above_limit_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (client, services) = setup(&dir);

    let err = call(
        &services,
        "search_content",
        json!({ "search_term": "x", "max_depth": 6, "execute": false }),
    )
    .await
    .unwrap_err();
    assert!(err
        .to_string()
        .contains("invalid parameter 'max_depth': must be between 1 and 5, got 6"));

    let ok = call(
        &services,
        "search_content",
        json!({ "search_term": "x", "max_depth": 5, "execute": false }),
    )
    .await
    .unwrap();
    assert_parses(ok["query"].as_str().unwrap());
    assert!(client.queries().is_empty());
}
