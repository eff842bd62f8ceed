//! Elasticsearch REST API Client
//!
//! HTTP client for the `_search` endpoint of an enriched index.

use super::index::SearchBackend;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use thiserror::Error;

/// Elasticsearch REST API client
#[derive(Clone)]
pub struct ElasticClient {
    client: Client,
    config: ElasticConfig,
}

/// Configuration for the Elasticsearch client
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    /// Base URL of the cluster (e.g., "http://127.0.0.1:9200")
    pub base_url: String,
    /// Optional basic auth user
    pub username: Option<String>,
    /// Optional basic auth password
    pub password: Option<String>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9200".to_string(),
            username: None,
            password: None,
            request_timeout_ms: 30_000,
        }
    }
}

impl ElasticClient {
    /// Create a new client with the given configuration
    pub fn new(config: ElasticConfig) -> Result<Self, ElasticError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &ElasticConfig {
        &self.config
    }

    fn search_url(&self, index: &str) -> String {
        format!("{}/{}/_search", self.config.base_url.trim_end_matches('/'), index)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_ref()),
            None => request,
        }
    }

    /// Check if the cluster answers
    pub async fn health_check(&self) -> Result<Value, ElasticError> {
        let url = format!("{}/_cluster/health", self.config.base_url.trim_end_matches('/'));

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(classify)?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(ElasticError::Unavailable)
        }
    }

    /// Run a search request against an index and return the raw response
    pub async fn search(&self, index: &str, body: &Value) -> Result<Value, ElasticError> {
        let url = self.search_url(index);
        tracing::debug!(index, "POST {}", url);

        let response = self
            .with_auth(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(ElasticError::ApiError {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}

#[async_trait]
impl SearchBackend for ElasticClient {
    async fn search(&self, index: &str, body: &Value) -> Result<Value, ElasticError> {
        ElasticClient::search(self, index, body).await
    }
}

fn classify(e: reqwest::Error) -> ElasticError {
    if e.is_timeout() {
        ElasticError::Timeout
    } else if e.is_connect() {
        ElasticError::Unavailable
    } else {
        ElasticError::Request(e)
    }
}

// ============================================
// Errors
// ============================================

/// Errors that can occur when talking to Elasticsearch
#[derive(Error, Debug)]
pub enum ElasticError {
    #[error("Elasticsearch unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,
}
