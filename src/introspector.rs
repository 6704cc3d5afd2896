//! Schema introspection with single-flight initialization.
//!
//! [`SchemaIntrospector`] owns the authoritative [`SchemaSnapshot`]. The first
//! call to [`initialize`](SchemaIntrospector::initialize) fetches the schema;
//! concurrent callers wait on the same fetch instead of issuing their own.
//! Later calls return the stored snapshot until
//! [`invalidate`](SchemaIntrospector::invalidate) drops it.
//!
//! Fetch errors propagate unchanged. Retry belongs to the [`GraphClient`].

use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::client::GraphClient;
use crate::schema::{FieldInfo, SchemaSnapshot, TypeDef};

/// Lifecycle of the snapshot held by an introspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
}

impl InitState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => InitState::Initializing,
            2 => InitState::Ready,
            _ => InitState::Uninitialized,
        }
    }
}

/// Fetches and holds the current schema snapshot.
pub struct SchemaIntrospector {
    client: Arc<dyn GraphClient>,
    snapshot: Mutex<Option<Arc<SchemaSnapshot>>>,
    state: AtomicU8,
    fetch_count: AtomicUsize,
}

impl SchemaIntrospector {
    pub fn new(client: Arc<dyn GraphClient>) -> Self {
        Self {
            client,
            snapshot: Mutex::new(None),
            state: AtomicU8::new(InitState::Uninitialized as u8),
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    pub fn state(&self) -> InitState {
        InitState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of introspection fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Fetch the schema if needed and return the current snapshot.
    ///
    /// The lock is held across the fetch, so concurrent callers queue
    /// behind the first one and then observe its result.
    pub async fn initialize(&self) -> Result<Arc<SchemaSnapshot>> {
        let mut guard = self.snapshot.lock().await;
        if let Some(snapshot) = guard.as_ref() {
            return Ok(snapshot.clone());
        }

        self.state
            .store(InitState::Initializing as u8, Ordering::SeqCst);
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let fetched = self
            .client
            .introspect()
            .await
            .and_then(|raw| SchemaSnapshot::from_introspection(&raw));

        match fetched {
            Ok(snapshot) => {
                info!(
                    endpoint = self.client.endpoint(),
                    content_types = snapshot.content_types().len(),
                    schema_version = snapshot.schema_version(),
                    "Schema introspected"
                );
                let snapshot = Arc::new(snapshot);
                *guard = Some(snapshot.clone());
                self.state.store(InitState::Ready as u8, Ordering::SeqCst);
                Ok(snapshot)
            }
            Err(e) => {
                self.state
                    .store(InitState::Uninitialized as u8, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Drop the snapshot; the next call refetches.
    pub async fn invalidate(&self) {
        let mut guard = self.snapshot.lock().await;
        *guard = None;
        self.state
            .store(InitState::Uninitialized as u8, Ordering::SeqCst);
    }

    /// Invalidate, then fetch a new snapshot.
    pub async fn refresh(&self) -> Result<Arc<SchemaSnapshot>> {
        self.invalidate().await;
        self.initialize().await
    }

    /// Sorted content type names.
    pub async fn content_types(&self) -> Result<Vec<String>> {
        Ok(self.initialize().await?.content_type_names())
    }

    /// Fields of a type; empty for unknown or non-object types.
    pub async fn fields_for_type(&self, type_name: &str) -> Result<Vec<FieldInfo>> {
        Ok(self.initialize().await?.fields_for_type(type_name))
    }

    pub async fn searchable_fields(&self) -> Result<Vec<String>> {
        Ok(self
            .initialize()
            .await?
            .searchable_fields()
            .iter()
            .cloned()
            .collect())
    }

    /// The `where` input type for a root query field, if any.
    pub async fn where_input_type(&self, query_field: &str) -> Result<Option<TypeDef>> {
        Ok(self
            .initialize()
            .await?
            .where_input_type(query_field)
            .cloned())
    }
}
