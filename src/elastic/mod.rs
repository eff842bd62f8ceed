//! Search Backend
//!
//! Connects the query builder to an Elasticsearch-compatible cluster.
//!
//! - **Client**: REST client for the `_search` endpoint
//! - **Index**: a named index plus the backend that serves it

mod client;
mod index;

pub use client::{ElasticClient, ElasticConfig, ElasticError};
pub use index::{Index, SearchBackend};

#[cfg(test)]
pub(crate) use index::testing;
