//! Shared helpers for integration tests: the crate's introspection
//! fixtures plus an in-process [`GraphClient`].

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cms_graph_mcp::client::GraphClient;
use cms_graph_mcp::config::Config;
use cms_graph_mcp::schema::SchemaSnapshot;
use cms_graph_mcp::services::CmsServices;

pub const ENDPOINT: &str = "https://cg.example.com/content/v2";

pub use cms_graph_mcp::fixtures::*;

pub fn snapshot(schema: &Value) -> SchemaSnapshot {
    SchemaSnapshot::from_introspection(schema).expect("fixture schema decodes")
}

// ── Mock client ─────────────────────────────────────────────────────

/// Answers introspection with a fixture schema and content queries with a
/// canned response, recording every document it receives.
pub struct MockClient {
    schema: Value,
    response: Value,
    delay: Duration,
    introspections: AtomicUsize,
    queries: Mutex<Vec<(String, Value)>>,
}

impl MockClient {
    pub fn new(schema: Value) -> Self {
        Self {
            schema,
            response: json!({ "data": { "_Content": { "items": [], "total": 0 } } }),
            delay: Duration::ZERO,
            introspections: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = response;
        self
    }

    pub fn introspections(&self) -> usize {
        self.introspections.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<(String, Value)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphClient for MockClient {
    async fn query(&self, document: &str, variables: Option<Value>) -> Result<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if document.contains("__schema") {
            self.introspections.fetch_add(1, Ordering::SeqCst);
            return Ok(self.schema.clone());
        }
        self.queries
            .lock()
            .unwrap()
            .push((document.to_string(), variables.unwrap_or(Value::Null)));
        Ok(self.response.clone())
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }
}

/// Services over `client` with the fragment cache in `cache_dir`.
pub fn services(client: Arc<MockClient>, cache_dir: &std::path::Path) -> Arc<CmsServices> {
    let mut config = Config::for_endpoint(ENDPOINT);
    config.cache.dir = cache_dir.to_path_buf();
    Arc::new(CmsServices::new(config, client))
}

// ── Query checks ────────────────────────────────────────────────────

/// Parse `query` and fail the test on any syntax error.
pub fn assert_parses(query: &str) {
    let tree = apollo_parser::Parser::new(query).parse();
    let errors: Vec<String> = tree.errors().map(|e| format!("{:?}", e)).collect();
    assert!(errors.is_empty(), "query does not parse: {:?}\n{}", errors, query);
}

/// Type names referenced by `... on X` inline fragments.
pub fn inline_fragment_types(query: &str) -> Vec<String> {
    query
        .split("... on ")
        .skip(1)
        .filter_map(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .collect()
}
