//! Aggregation Query Builder
//!
//! Builds search DSL requests for enriched indexes and shapes their
//! responses:
//!
//! - **Aggregation**: typed aggregation tree serialized to the DSL
//! - **Builder**: the fluent [`Query`] (filters, ranges, nesting, fetching)
//! - **Timeseries**: time series, single values and term buckets
//!
//! # Examples
//!
//! ```rust,ignore
//! use manuscripts::query::{Query, PeriodOptions, Interval};
//!
//! // Commits per month
//! let commits = Query::new(&index)
//!     .get_cardinality("hash")?
//!     .by_period()?
//!     .get_timeseries()
//!     .await?;
//!
//! // Closed issues per week since 2018
//! let closed = Query::new(&index)
//!     .is_closed()
//!     .since(start)
//!     .get_cardinality("id")?
//!     .by_period_with(PeriodOptions::new().interval(Interval::Week))?
//!     .get_timeseries()
//!     .await?;
//! ```

mod aggregation;
mod builder;
mod error;
mod timeseries;

pub use aggregation::{
    Aggregation, AggregationKind, ExtendedBounds, Interval, SortOrder, DEFAULT_PERCENTS,
    DEFAULT_PRECISION_THRESHOLD, DEFAULT_TERMS_SIZE, MISSING_BUCKET,
};
pub use builder::{
    MatchClause, PeriodOptions, Query, QueryDefaults, RangeFilter, DEFAULT_AUTHOR_FIELD,
    DEFAULT_DATE_FIELD, DEFAULT_ORG_FIELD,
};
pub use error::{QueryError, QueryResult};
pub use timeseries::{TermBucket, Timeseries, TimeseriesPoint, Trend};
