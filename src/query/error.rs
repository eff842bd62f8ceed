//! Query error types
//!
//! Defines all error conditions that can occur while building a query,
//! sending it, or reading its response.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// An aggregation was requested without a field
    #[error("Missing field for {0} aggregation")]
    MissingField(&'static str),

    /// A grouping was requested but there is no aggregation to nest in it
    #[error("No aggregation to nest under {0}")]
    NothingToNest(String),

    /// A fetch was requested with no aggregation configured
    #[error("No aggregations to fetch")]
    NoAggregations,

    /// A source fetch was requested without fields
    #[error("No source fields requested")]
    MissingSourceFields,

    /// Time series extraction on an aggregation without buckets
    #[error("Aggregation results have no buckets")]
    NoBuckets,

    /// A multi-valued aggregation result that cannot be reduced to one value
    #[error("Multi-value aggregation result not supported")]
    UnsupportedMultiValue,

    /// Unknown histogram interval
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Search backend error
    #[error("Backend error: {0}")]
    Backend(#[from] crate::elastic::ElasticError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
