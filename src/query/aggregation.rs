//! Aggregation tree
//!
//! Typed rendition of the search DSL aggregations the metrics need.
//! An [`Aggregation`] is a node (its kind and parameters) plus ordered,
//! named children, and serializes to
//! `{"<type>": {params}, "aggs": {"<name>": child, ...}}`.
//!
//! ```text
//! date_histogram(grimoire_creation_date)
//!   └─ "0": terms(author_uuid)
//!        └─ "0": cardinality(hash)
//! ```

use super::error::QueryError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;

/// Default `precision_threshold` for cardinality aggregations
pub const DEFAULT_PRECISION_THRESHOLD: u32 = 3000;

/// Default bucket count for terms aggregations
pub const DEFAULT_TERMS_SIZE: u32 = 10000;

/// Bucket key used for documents missing the grouping field
pub const MISSING_BUCKET: &str = "others";

/// Default percentiles requested by `percentiles` aggregations
pub const DEFAULT_PERCENTS: [f64; 7] = [1.0, 5.0, 25.0, 50.0, 75.0, 95.0, 99.0];

/// Histogram intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }
}

impl FromStr for Interval {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            _ => Err(QueryError::InvalidInterval(s.to_string())),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for terms buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// `extended_bounds` of a date histogram, in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtendedBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

/// Kind and parameters of a single aggregation node
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationKind {
    Sum {
        field: String,
    },
    Avg {
        field: String,
    },
    Min {
        field: String,
    },
    Max {
        field: String,
    },
    Cardinality {
        field: String,
        precision_threshold: u32,
    },
    ExtendedStats {
        field: String,
    },
    Percentiles {
        field: String,
        percents: Vec<f64>,
    },
    Terms {
        field: String,
        size: u32,
        /// Ordering on `_count`, if any
        order: Option<SortOrder>,
        missing: Option<String>,
    },
    DateHistogram {
        field: String,
        interval: Interval,
        time_zone: String,
        min_doc_count: u64,
        offset: Option<String>,
        extended_bounds: Option<ExtendedBounds>,
    },
}

impl AggregationKind {
    /// DSL name of this aggregation type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Sum { .. } => "sum",
            Self::Avg { .. } => "avg",
            Self::Min { .. } => "min",
            Self::Max { .. } => "max",
            Self::Cardinality { .. } => "cardinality",
            Self::ExtendedStats { .. } => "extended_stats",
            Self::Percentiles { .. } => "percentiles",
            Self::Terms { .. } => "terms",
            Self::DateHistogram { .. } => "date_histogram",
        }
    }

    /// Document field the aggregation runs on
    pub fn field(&self) -> &str {
        match self {
            Self::Sum { field }
            | Self::Avg { field }
            | Self::Min { field }
            | Self::Max { field }
            | Self::Cardinality { field, .. }
            | Self::ExtendedStats { field }
            | Self::Percentiles { field, .. }
            | Self::Terms { field, .. }
            | Self::DateHistogram { field, .. } => field,
        }
    }

    fn params(&self) -> Value {
        match self {
            Self::Sum { field }
            | Self::Avg { field }
            | Self::Min { field }
            | Self::Max { field }
            | Self::ExtendedStats { field } => json!({ "field": field }),
            Self::Cardinality {
                field,
                precision_threshold,
            } => json!({ "field": field, "precision_threshold": precision_threshold }),
            Self::Percentiles { field, percents } => {
                json!({ "field": field, "percents": percents })
            }
            Self::Terms {
                field,
                size,
                order,
                missing,
            } => {
                let mut params = Map::new();
                params.insert("field".into(), json!(field));
                params.insert("size".into(), json!(size));
                if let Some(order) = order {
                    params.insert("order".into(), json!({ "_count": order }));
                }
                if let Some(missing) = missing {
                    params.insert("missing".into(), json!(missing));
                }
                Value::Object(params)
            }
            Self::DateHistogram {
                field,
                interval,
                time_zone,
                min_doc_count,
                offset,
                extended_bounds,
            } => {
                let mut params = Map::new();
                params.insert("field".into(), json!(field));
                params.insert("interval".into(), json!(interval));
                params.insert("time_zone".into(), json!(time_zone));
                params.insert("min_doc_count".into(), json!(min_doc_count));
                if let Some(offset) = offset {
                    params.insert("offset".into(), json!(offset));
                }
                if let Some(bounds) = extended_bounds {
                    params.insert("extended_bounds".into(), json!(bounds));
                }
                Value::Object(params)
            }
        }
    }
}

/// An aggregation node with its named sub-aggregations
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    kind: AggregationKind,
    children: Vec<(String, Aggregation)>,
}

impl Aggregation {
    /// Wrap a kind into a childless node
    pub fn new(kind: AggregationKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn sum(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Sum {
            field: field.into(),
        })
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Avg {
            field: field.into(),
        })
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Min {
            field: field.into(),
        })
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Max {
            field: field.into(),
        })
    }

    /// Distinct count, approximate above the precision threshold
    pub fn cardinality(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Cardinality {
            field: field.into(),
            precision_threshold: DEFAULT_PRECISION_THRESHOLD,
        })
    }

    pub fn extended_stats(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::ExtendedStats {
            field: field.into(),
        })
    }

    pub fn percentiles(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Percentiles {
            field: field.into(),
            percents: DEFAULT_PERCENTS.to_vec(),
        })
    }

    /// Terms breakdown ordered by descending document count
    pub fn terms(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Terms {
            field: field.into(),
            size: DEFAULT_TERMS_SIZE,
            order: Some(SortOrder::Desc),
            missing: None,
        })
    }

    /// Date histogram in UTC that keeps empty buckets
    pub fn date_histogram(field: impl Into<String>, interval: Interval) -> Self {
        Self::new(AggregationKind::DateHistogram {
            field: field.into(),
            interval,
            time_zone: "UTC".to_string(),
            min_doc_count: 0,
            offset: None,
            extended_bounds: None,
        })
    }

    /// Builder: set the cardinality precision threshold
    pub fn with_precision_threshold(mut self, threshold: u32) -> Self {
        if let AggregationKind::Cardinality {
            precision_threshold,
            ..
        } = &mut self.kind
        {
            *precision_threshold = threshold;
        }
        self
    }

    /// Builder: set the terms bucket count
    pub fn with_size(mut self, n: u32) -> Self {
        if let AggregationKind::Terms { size, .. } = &mut self.kind {
            *size = n;
        }
        self
    }

    /// Builder: bucket documents lacking the field under `key`
    pub fn with_missing(mut self, key: impl Into<String>) -> Self {
        if let AggregationKind::Terms { missing, .. } = &mut self.kind {
            *missing = Some(key.into());
        }
        self
    }

    /// Builder: drop the explicit terms ordering
    pub fn without_order(mut self) -> Self {
        if let AggregationKind::Terms { order, .. } = &mut self.kind {
            *order = None;
        }
        self
    }

    /// Builder: set the histogram time zone
    pub fn with_time_zone(mut self, tz: impl Into<String>) -> Self {
        if let AggregationKind::DateHistogram { time_zone, .. } = &mut self.kind {
            *time_zone = tz.into();
        }
        self
    }

    /// Builder: set the histogram bucket offset (e.g. "+2d")
    pub fn with_offset(mut self, value: impl Into<String>) -> Self {
        if let AggregationKind::DateHistogram { offset, .. } = &mut self.kind {
            *offset = Some(value.into());
        }
        self
    }

    /// Builder: force the histogram to cover `bounds`
    pub fn with_extended_bounds(mut self, bounds: ExtendedBounds) -> Self {
        if let AggregationKind::DateHistogram {
            extended_bounds, ..
        } = &mut self.kind
        {
            *extended_bounds = Some(bounds);
        }
        self
    }

    /// Builder: set the histogram minimum bucket count
    pub fn with_min_doc_count(mut self, count: u64) -> Self {
        if let AggregationKind::DateHistogram { min_doc_count, .. } = &mut self.kind {
            *min_doc_count = count;
        }
        self
    }

    /// Builder: set requested percentiles
    pub fn with_percents(mut self, values: &[f64]) -> Self {
        if let AggregationKind::Percentiles { percents, .. } = &mut self.kind {
            *percents = values.to_vec();
        }
        self
    }

    /// Attach `child` under `name`, replacing a child of the same name
    pub fn metric(&mut self, name: impl Into<String>, child: Aggregation) -> &mut Self {
        let name = name.into();
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = child,
            None => self.children.push((name, child)),
        }
        self
    }

    pub fn kind(&self) -> &AggregationKind {
        &self.kind
    }

    pub fn children(&self) -> &[(String, Aggregation)] {
        &self.children
    }

    /// Get a child by name
    pub fn child(&self, name: &str) -> Option<&Aggregation> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Name under which a query stores this aggregation: `<type>_<field>`
    pub fn key(&self) -> String {
        format!("{}_{}", self.kind.type_name(), self.kind.field())
    }

    /// Serialize to the search DSL
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert(self.kind.type_name().to_string(), self.kind.params());
        if !self.children.is_empty() {
            let aggs: Map<String, Value> = self
                .children
                .iter()
                .map(|(name, child)| (name.clone(), child.to_json()))
                .collect();
            body.insert("aggs".to_string(), Value::Object(aggs));
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_metric_aggregations_json() {
        assert_eq!(
            Aggregation::sum("lines").to_json(),
            json!({"sum": {"field": "lines"}})
        );
        assert_eq!(
            Aggregation::avg("lines").to_json(),
            json!({"avg": {"field": "lines"}})
        );
        assert_eq!(
            Aggregation::extended_stats("lines").to_json(),
            json!({"extended_stats": {"field": "lines"}})
        );
        assert_eq!(
            Aggregation::cardinality("hash").to_json(),
            json!({"cardinality": {"field": "hash", "precision_threshold": 3000}})
        );
    }

    #[test]
    fn test_percentiles_json() {
        assert_eq!(
            Aggregation::percentiles("time_to_close_days").to_json(),
            json!({"percentiles": {
                "field": "time_to_close_days",
                "percents": [1.0, 5.0, 25.0, 50.0, 75.0, 95.0, 99.0]
            }})
        );
    }

    #[test]
    fn test_terms_json() {
        assert_eq!(
            Aggregation::terms("author_name").to_json(),
            json!({"terms": {"field": "author_name", "size": 10000, "order": {"_count": "desc"}}})
        );

        let grouping = Aggregation::terms("author_uuid")
            .without_order()
            .with_missing(MISSING_BUCKET);
        assert_eq!(
            grouping.to_json(),
            json!({"terms": {"field": "author_uuid", "size": 10000, "missing": "others"}})
        );
    }

    #[test]
    fn test_date_histogram_json() {
        let agg = Aggregation::date_histogram("created_at", Interval::Week)
            .with_offset("+2d")
            .with_extended_bounds(ExtendedBounds {
                min: Some(1420070400000),
                max: None,
            });

        assert_eq!(
            agg.to_json(),
            json!({"date_histogram": {
                "field": "created_at",
                "interval": "week",
                "time_zone": "UTC",
                "min_doc_count": 0,
                "offset": "+2d",
                "extended_bounds": {"min": 1420070400000_i64}
            }})
        );
    }

    #[test]
    fn test_nested_children() {
        let mut authors = Aggregation::terms("author_uuid");
        authors.metric("0", Aggregation::cardinality("hash"));
        let mut period = Aggregation::date_histogram("grimoire_creation_date", Interval::Month);
        period.metric("0", authors.clone());

        let json = period.to_json();
        assert_eq!(
            json["aggs"]["0"]["aggs"]["0"],
            json!({"cardinality": {"field": "hash", "precision_threshold": 3000}})
        );
        assert_eq!(period.child("0"), Some(&authors));
        assert!(period.child("1").is_none());
    }

    #[test]
    fn test_metric_replaces_same_name() {
        let mut agg = Aggregation::terms("author_uuid");
        agg.metric("0", Aggregation::sum("a"));
        agg.metric("0", Aggregation::sum("b"));

        assert_eq!(agg.children().len(), 1);
        assert_eq!(agg.child("0"), Some(&Aggregation::sum("b")));
    }

    #[test]
    fn test_keys() {
        assert_eq!(Aggregation::sum("hash").key(), "sum_hash");
        assert_eq!(Aggregation::extended_stats("x").key(), "extended_stats_x");
        assert_eq!(
            Aggregation::date_histogram("created_at", Interval::Day).key(),
            "date_histogram_created_at"
        );
    }

    #[test]
    fn test_setters_ignore_other_kinds() {
        let agg = Aggregation::sum("x").with_size(5).with_missing("none");
        assert_eq!(agg, Aggregation::sum("x"));
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!("month".parse::<Interval>().unwrap(), Interval::Month);
        assert_eq!("Quarter".parse::<Interval>().unwrap(), Interval::Quarter);
        assert_eq!("minute".parse::<Interval>().unwrap(), Interval::Minute);
        // No single-letter shorthands
        assert!("m".parse::<Interval>().is_err());
        assert!("w".parse::<Interval>().is_err());
        assert!("fortnight".parse::<Interval>().is_err());
        assert_eq!(Interval::Year.to_string(), "year");
    }
}
