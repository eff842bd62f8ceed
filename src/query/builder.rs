//! Query builder
//!
//! [`Query`] collects filters, per-field date ranges and a list of named
//! aggregations, and turns them into a single `_search` request.
//!
//! Aggregations are pushed one at a time (`get_cardinality`, `get_sum`, ...)
//! and grouping calls (`by_authors`, `by_organizations`, `by_period`) pop the
//! most recent one and nest it inside the grouping aggregation, so nesting
//! reads in the order the calls are chained:
//!
//! ```rust,ignore
//! // date_histogram > terms(author_uuid) > cardinality(hash)
//! let ts = Query::new(&index)
//!     .get_cardinality("hash")?
//!     .by_authors(None)?
//!     .by_period()?
//!     .get_timeseries()
//!     .await?;
//! ```
//!
//! Fetching aggregation results flushes the aggregation list: only one
//! top-level aggregation chain is active at a time.

use super::aggregation::{
    Aggregation, ExtendedBounds, Interval, DEFAULT_PRECISION_THRESHOLD, DEFAULT_TERMS_SIZE,
    MISSING_BUCKET,
};
use super::error::{QueryError, QueryResult};
use super::timeseries::{self, TermBucket, Timeseries};
use crate::elastic::Index;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Date field used by ranges and histograms when none is given
pub const DEFAULT_DATE_FIELD: &str = "grimoire_creation_date";

/// Field grouped on by [`Query::by_authors`] when none is given
pub const DEFAULT_AUTHOR_FIELD: &str = "author_uuid";

/// Field grouped on by [`Query::by_organizations`] when none is given
pub const DEFAULT_ORG_FIELD: &str = "author_org_name";

/// Settings every query on an index starts from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefaults {
    /// Histogram interval
    pub interval: Interval,
    /// Histogram bucket offset (e.g. "+2d")
    pub offset: Option<String>,
    /// Histogram time zone
    pub time_zone: String,
    /// Bucket count for terms aggregations, and hit count for source fetches
    pub terms_size: u32,
    /// Precision threshold for cardinality aggregations
    pub precision_threshold: u32,
    /// Lower bound applied to the default date field
    pub since: Option<DateTime<Utc>>,
    /// Upper bound applied to the default date field
    pub until: Option<DateTime<Utc>>,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            interval: Interval::Month,
            offset: None,
            time_zone: "UTC".to_string(),
            terms_size: DEFAULT_TERMS_SIZE,
            precision_threshold: DEFAULT_PRECISION_THRESHOLD,
            since: None,
            until: None,
        }
    }
}

/// Overrides for [`Query::by_period_with`]
#[derive(Debug, Clone, Default)]
pub struct PeriodOptions {
    pub field: Option<String>,
    pub interval: Option<Interval>,
    pub time_zone: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl PeriodOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn time_zone(mut self, tz: impl Into<String>) -> Self {
        self.time_zone = Some(tz.into());
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }
}

/// Lower/upper bounds on one field, as RFC 3339 strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RangeFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<String>,
}

/// A `match` clause: field and value
pub type MatchClause = (String, Value);

/// Builder for aggregation queries against one index
#[derive(Debug, Clone)]
pub struct Query {
    index: Index,
    must: Vec<MatchClause>,
    must_not: Vec<MatchClause>,
    range: BTreeMap<String, RangeFilter>,
    aggregations: Vec<(String, Aggregation)>,
    child_counters: HashMap<String, usize>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    interval: Interval,
    offset: Option<String>,
    time_zone: String,
    size: u32,
    precision_threshold: u32,
}

impl Query {
    /// Start a query on `index`, applying the index defaults
    pub fn new(index: &Index) -> Self {
        let defaults = index.defaults().clone();
        let query = Self {
            index: index.clone(),
            must: Vec::new(),
            must_not: Vec::new(),
            range: BTreeMap::new(),
            aggregations: Vec::new(),
            child_counters: HashMap::new(),
            start: None,
            end: None,
            interval: defaults.interval,
            offset: defaults.offset,
            time_zone: defaults.time_zone,
            size: defaults.terms_size,
            precision_threshold: defaults.precision_threshold,
        };

        let query = match defaults.since {
            Some(start) => query.since(start),
            None => query,
        };
        match defaults.until {
            Some(end) => query.until(end),
            None => query,
        }
    }

    /// Index this query runs against
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Set the default histogram interval
    pub fn interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Set the histogram bucket offset
    pub fn offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Set the histogram time zone
    pub fn time_zone(mut self, tz: impl Into<String>) -> Self {
        self.time_zone = tz.into();
        self
    }

    // ============================================
    // Filters
    // ============================================

    /// Require documents where `field` matches `value`
    pub fn add_query(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push((field.into(), value.into()));
        self
    }

    /// Exclude documents where `field` matches `value`
    pub fn add_inverse_query(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must_not.push((field.into(), value.into()));
        self
    }

    /// Only items whose state is open
    pub fn is_open(self) -> Self {
        self.add_query("state", "open")
    }

    /// Only items whose state is closed
    pub fn is_closed(self) -> Self {
        self.add_query("state", "closed")
    }

    /// Lower bound on the default date field
    pub fn since(self, start: DateTime<Utc>) -> Self {
        self.since_field(DEFAULT_DATE_FIELD, start)
    }

    /// Lower bound on `field`; also used as histogram start
    pub fn since_field(mut self, field: impl Into<String>, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.range.entry(field.into()).or_default().gte = Some(iso(start));
        self
    }

    /// Upper bound on the default date field
    pub fn until(self, end: DateTime<Utc>) -> Self {
        self.until_field(DEFAULT_DATE_FIELD, end)
    }

    /// Upper bound on `field`; also used as histogram end
    pub fn until_field(mut self, field: impl Into<String>, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self.range.entry(field.into()).or_default().lte = Some(iso(end));
        self
    }

    // ============================================
    // Metric aggregations
    // ============================================

    pub fn get_sum(self, field: &str) -> QueryResult<Self> {
        let agg = Aggregation::sum(required(field, "sum")?);
        Ok(self.push(agg))
    }

    pub fn get_average(self, field: &str) -> QueryResult<Self> {
        let agg = Aggregation::avg(required(field, "avg")?);
        Ok(self.push(agg))
    }

    pub fn get_percentiles(self, field: &str) -> QueryResult<Self> {
        let agg = Aggregation::percentiles(required(field, "percentiles")?);
        Ok(self.push(agg))
    }

    pub fn get_terms(self, field: &str) -> QueryResult<Self> {
        let agg = Aggregation::terms(required(field, "terms")?).with_size(self.size);
        Ok(self.push(agg))
    }

    pub fn get_min(self, field: &str) -> QueryResult<Self> {
        let agg = Aggregation::min(required(field, "min")?);
        Ok(self.push(agg))
    }

    pub fn get_max(self, field: &str) -> QueryResult<Self> {
        let agg = Aggregation::max(required(field, "max")?);
        Ok(self.push(agg))
    }

    pub fn get_cardinality(self, field: &str) -> QueryResult<Self> {
        let agg = Aggregation::cardinality(required(field, "cardinality")?)
            .with_precision_threshold(self.precision_threshold);
        Ok(self.push(agg))
    }

    pub fn get_extended_stats(self, field: &str) -> QueryResult<Self> {
        let agg = Aggregation::extended_stats(required(field, "extended_stats")?);
        Ok(self.push(agg))
    }

    fn push(mut self, agg: Aggregation) -> Self {
        let key = agg.key();
        match self.aggregations.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = agg,
            None => self.aggregations.push((key, agg)),
        }
        self
    }

    // ============================================
    // Groupings
    // ============================================

    /// Nest the last aggregation in a terms breakdown by author
    pub fn by_authors(self, field: Option<&str>) -> QueryResult<Self> {
        let field = field.unwrap_or(DEFAULT_AUTHOR_FIELD);
        let group = self.grouping_terms(field);
        self.nest(group)
    }

    /// Nest the last aggregation in a terms breakdown by organization
    pub fn by_organizations(self, field: Option<&str>) -> QueryResult<Self> {
        let field = field.unwrap_or(DEFAULT_ORG_FIELD);
        let group = self.grouping_terms(field);
        self.nest(group)
    }

    /// Nest the last aggregation in a date histogram with the query defaults
    pub fn by_period(self) -> QueryResult<Self> {
        self.by_period_with(PeriodOptions::default())
    }

    /// Nest the last aggregation in a date histogram
    pub fn by_period_with(self, options: PeriodOptions) -> QueryResult<Self> {
        let field = options
            .field
            .unwrap_or_else(|| DEFAULT_DATE_FIELD.to_string());
        let interval = options.interval.unwrap_or(self.interval);
        let time_zone = options
            .time_zone
            .unwrap_or_else(|| self.time_zone.clone());
        let start = options.start.or(self.start);
        let end = options.end.or(self.end);

        let mut histogram = Aggregation::date_histogram(field, interval).with_time_zone(time_zone);
        if let Some(offset) = &self.offset {
            histogram = histogram.with_offset(offset.clone());
        }
        if let Some(bounds) = bounds(start, end) {
            histogram = histogram.with_extended_bounds(bounds);
        }

        self.nest(histogram)
    }

    fn grouping_terms(&self, field: &str) -> Aggregation {
        Aggregation::terms(field)
            .without_order()
            .with_missing(MISSING_BUCKET)
            .with_size(self.size)
    }

    /// Pop the last aggregation and attach it as the next numbered child of
    /// the aggregation stored under `group.key()`, creating it from `group`
    /// if absent.
    ///
    /// A grouping never nests under its own key: `by_period()` twice in a
    /// row is an error.
    fn nest(mut self, group: Aggregation) -> QueryResult<Self> {
        let key = group.key();
        let (child_key, child) = self
            .aggregations
            .pop()
            .ok_or_else(|| QueryError::NothingToNest(key.clone()))?;
        if child_key == key {
            return Err(QueryError::NothingToNest(key));
        }

        let counter = self.child_counters.entry(key.clone()).or_insert(0);
        let name = counter.to_string();
        *counter += 1;

        match self.aggregations.iter_mut().find(|(k, _)| *k == key) {
            Some((_, parent)) => {
                parent.metric(name, child);
            }
            None => {
                let mut parent = group;
                parent.metric(name, child);
                self.aggregations.push((key, parent));
            }
        }

        Ok(self)
    }

    // ============================================
    // Accessors
    // ============================================

    /// Named aggregations in insertion order
    pub fn aggregations(&self) -> &[(String, Aggregation)] {
        &self.aggregations
    }

    /// Remove and return the most recent aggregation
    pub fn pop_aggregation(&mut self) -> Option<(String, Aggregation)> {
        self.aggregations.pop()
    }

    /// Drop all aggregations
    pub fn reset_aggregations(&mut self) {
        self.aggregations.clear();
        self.child_counters.clear();
    }

    pub fn range(&self) -> &BTreeMap<String, RangeFilter> {
        &self.range
    }

    pub fn must(&self) -> &[MatchClause] {
        &self.must
    }

    pub fn must_not(&self) -> &[MatchClause] {
        &self.must_not
    }

    // ============================================
    // Request building
    // ============================================

    /// The `query` part of the request
    pub fn build_query(&self) -> Value {
        if self.must.is_empty() && self.must_not.is_empty() && self.range.is_empty() {
            return json!({ "match_all": {} });
        }

        let mut bool_query = Map::new();
        if !self.must.is_empty() {
            bool_query.insert("must".into(), match_clauses(&self.must));
        }
        if !self.must_not.is_empty() {
            bool_query.insert("must_not".into(), match_clauses(&self.must_not));
        }
        if !self.range.is_empty() {
            let ranges: Vec<Value> = self
                .range
                .iter()
                .map(|(field, bounds)| json!({ "range": { field.as_str(): bounds } }))
                .collect();
            bool_query.insert("filter".into(), Value::Array(ranges));
        }

        json!({ "bool": bool_query })
    }

    /// Aggregation request: no hits, top-level aggregations named "0".."n-1"
    pub fn build_aggregation_request(&self) -> Value {
        let aggs: Map<String, Value> = self
            .aggregations
            .iter()
            .enumerate()
            .map(|(i, (_, agg))| (i.to_string(), agg.to_json()))
            .collect();

        json!({
            "query": self.build_query(),
            "size": 0,
            "aggs": aggs,
        })
    }

    /// Source request returning only `fields` of each hit
    pub fn build_source_request(&self, fields: &[&str]) -> Value {
        json!({
            "query": self.build_query(),
            "_source": fields,
            "size": self.size,
        })
    }

    // ============================================
    // Fetching
    // ============================================

    /// Send the aggregation request and flush the aggregations.
    ///
    /// Returns the raw response together with the name of the last
    /// top-level aggregation.
    async fn fetch_last(&mut self) -> QueryResult<(Value, String)> {
        if self.aggregations.is_empty() {
            return Err(QueryError::NoAggregations);
        }
        let last = (self.aggregations.len() - 1).to_string();
        let response = self.fetch_aggregation_results().await?;
        Ok((response, last))
    }

    /// Send the aggregation request, flush the aggregations and return the
    /// raw response
    pub async fn fetch_aggregation_results(&mut self) -> QueryResult<Value> {
        if self.aggregations.is_empty() {
            return Err(QueryError::NoAggregations);
        }

        let body = self.build_aggregation_request();
        tracing::debug!(
            index = self.index.name(),
            aggregations = self.aggregations.len(),
            "Fetching aggregation results"
        );

        let response = self.index.search(&body).await?;
        self.reset_aggregations();
        Ok(response)
    }

    /// Fetch `fields` from the `_source` of the matching documents
    pub async fn fetch_results_from_source(&mut self, fields: &[&str]) -> QueryResult<Vec<Value>> {
        if fields.is_empty() {
            return Err(QueryError::MissingSourceFields);
        }
        self.reset_aggregations();

        let body = self.build_source_request(fields);
        tracing::debug!(index = self.index.name(), ?fields, "Fetching source fields");

        let response = self.index.search(&body).await?;
        let hits = response
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .ok_or_else(|| QueryError::InvalidResponse("response without hits.hits".into()))?;

        Ok(hits
            .iter()
            .filter_map(|hit| hit.get("_source").cloned())
            .collect())
    }

    /// Time series of the first child of the last top-level aggregation
    pub async fn get_timeseries(&mut self) -> QueryResult<Timeseries> {
        self.get_timeseries_for_child(0).await
    }

    /// Time series of child `child` of the last top-level aggregation
    pub async fn get_timeseries_for_child(&mut self, child: usize) -> QueryResult<Timeseries> {
        let (response, last) = self.fetch_last().await?;
        let aggregation = last_aggregation(&response, &last)?;
        Timeseries::from_aggregation(aggregation, child)
    }

    /// Single value of the last top-level aggregation
    pub async fn get_aggs(&mut self) -> QueryResult<Option<f64>> {
        let (response, last) = self.fetch_last().await?;
        timeseries::single_value(&response, &last)
    }

    /// Term buckets of the last top-level aggregation
    pub async fn get_list(&mut self) -> QueryResult<Vec<TermBucket>> {
        let (response, last) = self.fetch_last().await?;
        let aggregation = last_aggregation(&response, &last)?;
        timeseries::term_buckets(aggregation, 0)
    }
}

fn last_aggregation<'a>(response: &'a Value, name: &str) -> QueryResult<&'a Value> {
    response
        .get("aggregations")
        .and_then(|a| a.get(name))
        .ok_or_else(|| QueryError::InvalidResponse(format!("missing aggregation {}", name)))
}

fn required<'a>(field: &'a str, aggregation: &'static str) -> QueryResult<&'a str> {
    if field.trim().is_empty() {
        Err(QueryError::MissingField(aggregation))
    } else {
        Ok(field)
    }
}

fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn match_clauses(clauses: &[MatchClause]) -> Value {
    Value::Array(
        clauses
            .iter()
            .map(|(field, value)| json!({ "match": { field.as_str(): value } }))
            .collect(),
    )
}

/// Histogram bounds in epoch milliseconds, sub-second precision dropped
fn bounds(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<ExtendedBounds> {
    if start.is_none() && end.is_none() {
        return None;
    }
    Some(ExtendedBounds {
        min: start.map(|s| s.timestamp() * 1000),
        max: end.map(|e| e.timestamp() * 1000),
    })
}
