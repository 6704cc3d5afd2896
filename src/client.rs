//! GraphQL transport.
//!
//! The discovery engine talks to the CMS only through the [`GraphClient`]
//! trait: run a document with variables, get raw JSON back. [`HttpGraphClient`]
//! is the production implementation over `reqwest`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Timeouts and connection errors → retry
//! - HTTP 401/403 → fail immediately with [`GraphError::Auth`]
//! - Other 4xx → fail immediately
//! - Backoff: `retry_base_ms × 2^(attempt-1)`, exponent capped at 5
//!
//! # Authentication
//!
//! - `single_key` → appended as the `auth` query parameter
//! - `app_key` + `secret` → HTTP Basic
//! - neither → anonymous

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::schema::INTROSPECTION_QUERY;

/// Classified transport failures.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },
    #[error("rate limited by GraphQL endpoint: {0}")]
    RateLimited(String),
    #[error("GraphQL request timed out")]
    Timeout,
    #[error("GraphQL endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("network error: {0}")]
    Network(String),
}

impl GraphError {
    fn is_retryable(&self) -> bool {
        match self {
            GraphError::RateLimited(_) | GraphError::Timeout | GraphError::Network(_) => true,
            GraphError::Http { status, .. } => *status >= 500,
            GraphError::Auth { .. } | GraphError::GraphQl(_) => false,
        }
    }
}

/// Executes GraphQL documents against the CMS.
///
/// Implementations carry authentication, retry, and error classification.
/// The returned value is the raw response body (`{"data": ..., "errors": ...}`).
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Run a query document with optional variables.
    async fn query(&self, document: &str, variables: Option<Value>) -> Result<Value>;

    /// Run the standard introspection query.
    async fn introspect(&self) -> Result<Value> {
        self.query(INTROSPECTION_QUERY, None).await
    }

    /// Endpoint identity used to partition caches.
    fn endpoint(&self) -> &str;
}

/// `reqwest`-backed [`GraphClient`].
pub struct HttpGraphClient {
    http: reqwest::Client,
    config: GraphConfig,
}

impl HttpGraphClient {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .json(body);

        if let Some(key) = &self.config.single_key {
            req = req.query(&[("auth", key)]);
        } else if let (Some(app_key), Some(secret)) = (&self.config.app_key, &self.config.secret) {
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", app_key, secret));
            req = req.header("Authorization", format!("Basic {}", token));
        }

        req
    }

    async fn send_once(&self, body: &Value) -> std::result::Result<Value, GraphError> {
        let response = self.request(body).send().await.map_err(|e| {
            if e.is_timeout() {
                GraphError::Timeout
            } else {
                GraphError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            let json: Value = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    GraphError::Timeout
                } else {
                    GraphError::Network(e.to_string())
                }
            })?;
            return check_graphql_errors(json);
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), body_text))
    }
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn query(&self, document: &str, variables: Option<Value>) -> Result<Value> {
        let body = json!({
            "query": document,
            "variables": variables.unwrap_or_else(|| json!({})),
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: base, 2×base, 4×base, ...
                let delay = Duration::from_millis(
                    self.config.retry_base_ms * (1u64 << (attempt - 1).min(5)),
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&body).await {
                Ok(json) => return Ok(json),
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "GraphQL request failed, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            retries = self.config.max_retries,
            "GraphQL request exhausted retries"
        );
        Err(last_err
            .map(anyhow::Error::from)
            .unwrap_or_else(|| anyhow::anyhow!("GraphQL request failed after retries")))
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

fn classify_status(status: u16, body: String) -> GraphError {
    match status {
        401 | 403 => GraphError::Auth { status, body },
        429 => GraphError::RateLimited(body),
        408 | 504 => GraphError::Timeout,
        _ => GraphError::Http { status, body },
    }
}

/// Fail on responses that carry `errors` and no `data`.
///
/// Partial responses (data plus errors) are passed through untouched.
fn check_graphql_errors(json: Value) -> std::result::Result<Value, GraphError> {
    let has_data = json.get("data").map(|d| !d.is_null()).unwrap_or(false);
    let errors: Vec<String> = json
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|arr| {
            arr.iter()
                .map(|e| {
                    e.get("message")
                        .and_then(|m| m.as_str())
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| e.to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    if !has_data && !errors.is_empty() {
        return Err(GraphError::GraphQl(errors));
    }
    Ok(json)
}
