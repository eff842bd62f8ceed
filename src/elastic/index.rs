//! Index handle
//!
//! An [`Index`] names an enriched index and carries the backend that can
//! search it, together with the defaults every [`Query`](crate::query::Query)
//! built on it starts from.

use super::client::ElasticError;
use crate::query::QueryDefaults;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Anything able to answer a `_search` request
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Send `body` to the `_search` endpoint of `index`
    async fn search(&self, index: &str, body: &Value) -> Result<Value, ElasticError>;
}

/// A named index on a search backend
#[derive(Clone)]
pub struct Index {
    name: String,
    backend: Arc<dyn SearchBackend>,
    defaults: QueryDefaults,
}

impl Index {
    /// Create an index handle with default query settings
    pub fn new(name: impl Into<String>, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
            defaults: QueryDefaults::default(),
        }
    }

    /// Builder: replace the query defaults
    pub fn with_defaults(mut self, defaults: QueryDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defaults(&self) -> &QueryDefaults {
        &self.defaults
    }

    /// Run a search request on this index
    pub async fn search(&self, body: &Value) -> Result<Value, ElasticError> {
        self.backend.search(&self.name, body).await
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_search_goes_to_named_index() {
        let (index, backend) = index_with(vec![json!({"hits": {"total": 0, "hits": []}})]);

        let response = index.search(&json!({"size": 0})).await.unwrap();

        assert_eq!(response["hits"]["total"], 0);
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "test_index");
        assert_eq!(requests[0].1, json!({"size": 0}));
    }

    #[tokio::test]
    async fn test_exhausted_backend_is_unavailable() {
        let (index, _backend) = index_with(vec![]);
        assert!(index.search(&json!({})).await.is_err());
    }
}
