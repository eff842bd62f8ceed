//! # Manuscripts
//!
//! Development activity metrics computed on enriched search indexes.
//!
//! ## Modules
//!
//! - [`query`]: aggregation query builder and response shaping
//! - [`elastic`]: search backend (Elasticsearch REST client) and index handles
//! - [`metrics`]: named metrics (commits, authors, tickets) and dashboard sections
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use manuscripts::elastic::{ElasticClient, ElasticConfig, Index};
//! use manuscripts::query::Query;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(ElasticClient::new(ElasticConfig::default())?);
//!     let git = Index::new("git_enriched", client);
//!
//!     // Distinct commits per month
//!     let commits = Query::new(&git)
//!         .get_cardinality("hash")?
//!         .by_period()?
//!         .get_timeseries()
//!         .await?;
//!
//!     for point in &commits.points {
//!         println!("{} {:?}", point.date, point.value);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod elastic;
pub mod metrics;
pub mod query;

pub use config::{Config, ConfigError, LoadedConfig, LoggingConfig};

pub use elastic::{ElasticClient, ElasticConfig, ElasticError, Index, SearchBackend};

pub use query::{
    Aggregation, Interval, PeriodOptions, Query, QueryDefaults, QueryError, QueryResult,
    TermBucket, Timeseries, TimeseriesPoint, Trend,
};

pub use metrics::{Metric, MetricDescriptor, MetricResult, Section, SectionValue, Sections};
