//! Generated documents must parse, be deterministic, and degrade cleanly
//! when the schema lacks a capability.

mod common;

use std::collections::BTreeMap;

use cms_graph_mcp::query_builder::{
    FacetSpec, FacetedSearchParams, GetByIdParams, GetByPathParams, QueryBuilderOptions,
    QueryPlanner, RelatedContentParams, SearchParams,
};
use cms_graph_mcp::schema::SchemaSnapshot;
use common::*;
use serde_json::json;

fn option_grid() -> Vec<QueryBuilderOptions> {
    let mut grid = Vec::new();
    for max_depth in 1..=3 {
        for include_metadata in [true, false] {
            grid.push(QueryBuilderOptions {
                max_depth,
                include_metadata,
                ..QueryBuilderOptions::default()
            });
        }
    }
    grid.push(QueryBuilderOptions {
        include_fields: Some(vec!["Title".into(), "Heading".into()]),
        ..QueryBuilderOptions::default()
    });
    grid.push(QueryBuilderOptions {
        exclude_fields: Some(vec!["Body".into(), "Author".into()]),
        ..QueryBuilderOptions::default()
    });
    grid.push(QueryBuilderOptions {
        include_fields: Some(vec!["DoesNotExist".into()]),
        include_metadata: false,
        ..QueryBuilderOptions::default()
    });
    grid
}

fn type_sets(snapshot: &SchemaSnapshot) -> Vec<Vec<String>> {
    let names = snapshot.content_type_names();
    let mut sets: Vec<Vec<String>> = names.iter().map(|n| vec![n.clone()]).collect();
    sets.push(names.clone());
    sets.push(vec!["ArticlePage".into(), "HeroBlock".into()]);
    sets
}

fn assert_valid(snapshot: &SchemaSnapshot, query: &str) {
    assert_parses(query);
    for t in inline_fragment_types(query) {
        assert!(
            snapshot.get_type(&t).is_some(),
            "inline fragment on unknown type {}\n{}",
            t,
            query
        );
    }
}

#[test]
fn test_every_operation_parses_across_options_and_types() {
    let snapshot = snapshot(&cms_schema());
    let mut facets = BTreeMap::new();
    facets.insert(
        "types".to_string(),
        FacetSpec {
            field: "_metadata.types".into(),
            limit: 5,
        },
    );

    for options in option_grid() {
        let planner = QueryPlanner::new(&snapshot, &options);
        for types in type_sets(&snapshot) {
            let search = SearchParams {
                search_term: Some("pricing \"quoted\"".into()),
                content_types: types.clone(),
                locale: Some("en".into()),
                limit: Some(7),
                skip: Some(2),
                ..SearchParams::default()
            };
            assert_valid(&snapshot, &planner.search(&search).unwrap().query);

            let by_id = GetByIdParams {
                id: "a1b2c3".into(),
                content_types: types.clone(),
                locale: None,
            };
            assert_valid(&snapshot, &planner.get_by_id(&by_id).unwrap().query);

            let by_path = GetByPathParams {
                path: "/en/news/".into(),
                content_types: types.clone(),
                locale: Some("sv".into()),
            };
            assert_valid(&snapshot, &planner.get_by_path(&by_path).unwrap().query);

            let faceted = FacetedSearchParams {
                search: search.clone(),
                facets: facets.clone(),
            };
            assert_valid(&snapshot, &planner.faceted_search(&faceted).unwrap().query);

            let related = RelatedContentParams {
                id: Some("a1b2c3".into()),
                terms: vec!["pricing".into(), "plans".into()],
                content_types: types.clone(),
                locale: None,
                limit: None,
            };
            assert_valid(&snapshot, &planner.related_content(&related).unwrap().query);
        }
    }
}

#[test]
fn test_search_without_types_parses() {
    let snapshot = snapshot(&cms_schema());
    let options = QueryBuilderOptions::default();
    let built = QueryPlanner::new(&snapshot, &options)
        .search(&SearchParams::default())
        .unwrap();
    assert_valid(&snapshot, &built.query);
    assert!(built.query.contains("__typename"));
    assert!(inline_fragment_types(&built.query).is_empty());
}

#[test]
fn test_identical_params_give_identical_queries() {
    let snapshot = snapshot(&cms_schema());
    let options = QueryBuilderOptions::default();
    let params = || SearchParams {
        search_term: Some("pricing".into()),
        content_types: vec!["BlogPost".into(), "ArticlePage".into()],
        limit: Some(10),
        skip: Some(20),
        ..SearchParams::default()
    };

    let first = QueryPlanner::new(&snapshot, &options).search(&params()).unwrap();
    let second = QueryPlanner::new(&snapshot, &options).search(&params()).unwrap();
    assert_eq!(first.query, second.query);
    assert_eq!(first.variables, second.variables);

    // A second decode of the same introspection changes nothing.
    let again = common::snapshot(&cms_schema());
    let third = QueryPlanner::new(&again, &options).search(&params()).unwrap();
    assert_eq!(first.query, third.query);
}

#[test]
fn test_values_are_bound_as_variables() {
    let snapshot = snapshot(&cms_schema());
    let options = QueryBuilderOptions::default();
    let built = QueryPlanner::new(&snapshot, &options)
        .search(&SearchParams {
            search_term: Some("x\") { evil }".into()),
            limit: Some(3),
            ..SearchParams::default()
        })
        .unwrap();
    assert!(!built.query.contains("evil"));
    assert_eq!(built.variables["searchTerm"], json!("x\") { evil }"));
    assert_eq!(built.variables["limit"], json!(3));
    assert_parses(&built.query);
}

#[test]
fn test_missing_content_root_names_capability() {
    let snapshot = snapshot(&schema_without_content_root());
    let options = QueryBuilderOptions::default();
    let planner = QueryPlanner::new(&snapshot, &options);

    let err = planner
        .search(&SearchParams {
            search_term: Some("anything".into()),
            ..SearchParams::default()
        })
        .unwrap_err();
    assert!(err.to_string().contains("content query field"), "{}", err);

    let err = planner
        .get_by_id(&GetByIdParams {
            id: "k".into(),
            ..GetByIdParams::default()
        })
        .unwrap_err();
    assert!(err.to_string().contains("content query field"));
}

#[test]
fn test_type_filter_dropped_without_filter_shape() {
    let snapshot = snapshot(&schema_without_type_filter());
    let options = QueryBuilderOptions::default();
    let built = QueryPlanner::new(&snapshot, &options)
        .search(&SearchParams {
            search_term: Some("pricing".into()),
            content_types: vec!["ArticlePage".into()],
            ..SearchParams::default()
        })
        .unwrap();
    assert_valid(&snapshot, &built.query);
    assert!(!built.variables.contains_key("contentTypes"));
    assert!(!built.variables.contains_key("contentType"));
    assert_eq!(inline_fragment_types(&built.query), vec!["ArticlePage"]);
}

#[test]
fn test_fuzzy_type_names_resolve() {
    let snapshot = snapshot(&cms_schema());
    let options = QueryBuilderOptions::default();
    let built = QueryPlanner::new(&snapshot, &options)
        .search(&SearchParams {
            content_types: vec!["blog".into(), "NoSuchThing".into()],
            ..SearchParams::default()
        })
        .unwrap();
    assert_eq!(inline_fragment_types(&built.query), vec!["BlogPost"]);
}

#[test]
fn test_self_referencing_type_stays_small_at_max_depth() {
    let snapshot = snapshot(&recursive_schema());
    let options = QueryBuilderOptions {
        max_depth: 8,
        max_depth_limit: 8,
        ..QueryBuilderOptions::default()
    };
    let built = QueryPlanner::new(&snapshot, &options)
        .search(&SearchParams {
            content_types: vec!["TreePage".into()],
            ..SearchParams::default()
        })
        .unwrap();
    assert_valid(&snapshot, &built.query);
    assert!(built.query.len() < 1024, "{}", built.query);
    assert!(!built.query.contains("A {"));
}
