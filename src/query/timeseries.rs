//! Response shaping
//!
//! Turns the JSON aggregation envelope returned by the search backend into
//! time series, single values and ranked term buckets.

use super::error::{QueryError, QueryResult};
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// One histogram bucket of a time series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesPoint {
    /// Calendar date the bucket starts on (in the histogram time zone)
    pub date: NaiveDate,
    /// Metric value, `None` when the backend could not compute one
    pub value: Option<f64>,
    /// Bucket start as Unix timestamp in seconds
    pub unixtime: i64,
}

/// A metric sampled per histogram bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeseries {
    pub points: Vec<TimeseriesPoint>,
}

/// Last value of a series and its change against the previous one
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub last: f64,
    /// Integer percentage of `last - previous` relative to `last`
    pub percentage: i64,
}

/// A bucket of a terms aggregation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermBucket {
    pub key: String,
    pub doc_count: u64,
    /// Value of the first sub-aggregation, if any
    pub value: Option<f64>,
}

impl Timeseries {
    /// Build a series from a histogram aggregation result.
    ///
    /// `child` selects the sub-aggregation (`"0"`, `"1"`, ...) providing the
    /// value; buckets without it fall back to their `doc_count`.
    pub fn from_aggregation(aggregation: &Value, child: usize) -> QueryResult<Self> {
        let buckets = aggregation
            .get("buckets")
            .and_then(Value::as_array)
            .ok_or(QueryError::NoBuckets)?;

        let child = child.to_string();
        let points = buckets
            .iter()
            .map(|bucket| point_from_bucket(bucket, &child))
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn last(&self) -> Option<&TimeseriesPoint> {
        self.points.last()
    }

    /// Compare the last value with the one before it
    pub fn trend(&self) -> Option<Trend> {
        let n = self.points.len();
        if n < 2 {
            return None;
        }
        let last = self.points[n - 1].value?;
        let previous = self.points[n - 2].value?;

        let percentage = if last == 0.0 {
            if previous > 0.0 {
                -100
            } else {
                0
            }
        } else {
            ((last - previous) / last * 100.0) as i64
        };

        Some(Trend { last, percentage })
    }

    /// Pointwise `numerator / denominator`, matching buckets by start time.
    ///
    /// Buckets whose denominator is zero or missing get no value.
    pub fn ratio(numerator: &Timeseries, denominator: &Timeseries) -> Timeseries {
        let denominators: HashMap<i64, Option<f64>> = denominator
            .points
            .iter()
            .map(|p| (p.unixtime, p.value))
            .collect();

        let points = numerator
            .points
            .iter()
            .map(|p| {
                let value = match (p.value, denominators.get(&p.unixtime).copied().flatten()) {
                    (Some(n), Some(d)) if d != 0.0 => Some(n / d),
                    _ => None,
                };
                TimeseriesPoint { value, ..p.clone() }
            })
            .collect();

        Timeseries { points }
    }
}

fn point_from_bucket(bucket: &Value, child: &str) -> QueryResult<TimeseriesPoint> {
    let key = bucket
        .get("key")
        .and_then(|k| k.as_i64().or_else(|| k.as_f64().map(|f| f as i64)))
        .ok_or_else(|| QueryError::InvalidResponse("histogram bucket without key".into()))?;

    let date = bucket
        .get("key_as_string")
        .and_then(Value::as_str)
        .and_then(date_from_key_string)
        .or_else(|| DateTime::from_timestamp_millis(key).map(|dt| dt.date_naive()))
        .ok_or_else(|| QueryError::InvalidResponse(format!("bad bucket key {}", key)))?;

    let value = match bucket.get(child) {
        Some(sub) => metric_value(sub),
        None => bucket.get("doc_count").and_then(Value::as_f64),
    };

    Ok(TimeseriesPoint {
        date,
        value,
        unixtime: key / 1000,
    })
}

/// Bucket date as formatted by the backend: RFC 3339 or a `%Y-%m-%d` prefix
fn date_from_key_string(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    s.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Value of a single-value metric result; the median for percentiles
fn metric_value(result: &Value) -> Option<f64> {
    match result.get("values") {
        Some(values) => values.get("50.0").and_then(Value::as_f64),
        None => result.get("value").and_then(Value::as_f64),
    }
}

/// Single value of the aggregation `name`, or the hit total when the
/// aggregation carries none
pub(crate) fn single_value(response: &Value, name: &str) -> QueryResult<Option<f64>> {
    if let Some(result) = response.get("aggregations").and_then(|a| a.get(name)) {
        if let Some(values) = result.get("values") {
            return values
                .get("50.0")
                .map(Value::as_f64)
                .ok_or(QueryError::UnsupportedMultiValue);
        }
        if let Some(value) = result.get("value") {
            return Ok(value.as_f64());
        }
    }
    hit_total(response).map(Some)
}

/// Total hits, accepting both the numeric and the `{"value": n}` forms
pub(crate) fn hit_total(response: &Value) -> QueryResult<f64> {
    let total = response
        .get("hits")
        .and_then(|h| h.get("total"))
        .ok_or_else(|| QueryError::InvalidResponse("response without hits.total".into()))?;

    total
        .as_f64()
        .or_else(|| total.get("value").and_then(Value::as_f64))
        .ok_or_else(|| QueryError::InvalidResponse(format!("unexpected hits.total {}", total)))
}

/// Buckets of a terms aggregation result
pub(crate) fn term_buckets(aggregation: &Value, child: usize) -> QueryResult<Vec<TermBucket>> {
    let buckets = aggregation
        .get("buckets")
        .and_then(Value::as_array)
        .ok_or(QueryError::NoBuckets)?;

    let child = child.to_string();
    Ok(buckets
        .iter()
        .map(|bucket| {
            let key = match bucket.get("key") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            TermBucket {
                key,
                doc_count: bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
                value: bucket.get(child.as_str()).and_then(metric_value),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn histogram() -> Value {
        json!({
            "buckets": [
                {"key_as_string": "2018-05-01T00:00:00.000Z", "key": 1525132800000_i64, "doc_count": 12,
                 "0": {"value": 7.0}},
                {"key_as_string": "2018-06-01T00:00:00.000Z", "key": 1527811200000_i64, "doc_count": 3,
                 "0": {"value": 2.0}},
                {"key_as_string": "2018-07-01T00:00:00.000Z", "key": 1530403200000_i64, "doc_count": 0}
            ]
        })
    }

    #[test]
    fn test_from_aggregation_child_values() {
        let ts = Timeseries::from_aggregation(&histogram(), 0).unwrap();

        assert_eq!(ts.len(), 3);
        assert_eq!(ts.points[0].date, NaiveDate::from_ymd_opt(2018, 5, 1).unwrap());
        assert_eq!(ts.points[0].unixtime, 1525132800);
        // Missing child falls back to doc_count
        assert_eq!(ts.values(), vec![Some(7.0), Some(2.0), Some(0.0)]);
    }

    #[test]
    fn test_from_aggregation_doc_count_for_unknown_child() {
        let ts = Timeseries::from_aggregation(&histogram(), 1).unwrap();
        assert_eq!(ts.values(), vec![Some(12.0), Some(3.0), Some(0.0)]);
    }

    #[test]
    fn test_percentiles_median() {
        let agg = json!({
            "buckets": [
                {"key_as_string": "2018-05-01T00:00:00.000Z", "key": 1525132800000_i64, "doc_count": 4,
                 "0": {"values": {"1.0": 0.1, "50.0": 3.5, "99.0": 20.0}}},
                {"key_as_string": "2018-06-01T00:00:00.000Z", "key": 1527811200000_i64, "doc_count": 0,
                 "0": {"values": {"1.0": "NaN", "50.0": "NaN", "99.0": "NaN"}}}
            ]
        });

        let ts = Timeseries::from_aggregation(&agg, 0).unwrap();
        assert_eq!(ts.values(), vec![Some(3.5), None]);
    }

    #[test]
    fn test_date_uses_time_zone_of_key() {
        let agg = json!({
            "buckets": [
                {"key_as_string": "2018-05-01T00:00:00.000+02:00", "key": 1525125600000_i64, "doc_count": 1}
            ]
        });
        let ts = Timeseries::from_aggregation(&agg, 0).unwrap();
        assert_eq!(ts.points[0].date, NaiveDate::from_ymd_opt(2018, 5, 1).unwrap());
    }

    #[test]
    fn test_date_from_plain_key_string() {
        // Madrid midnight is the previous day in UTC
        let agg = json!({
            "buckets": [
                {"key_as_string": "2018-05-01", "key": 1525125600000_i64, "doc_count": 1},
                {"key_as_string": "2018-06-01 00:00:00", "key": 1527804000000_i64, "doc_count": 1}
            ]
        });
        let ts = Timeseries::from_aggregation(&agg, 0).unwrap();
        assert_eq!(ts.points[0].date, NaiveDate::from_ymd_opt(2018, 5, 1).unwrap());
        assert_eq!(ts.points[1].date, NaiveDate::from_ymd_opt(2018, 6, 1).unwrap());
    }

    #[test]
    fn test_date_falls_back_to_key() {
        let agg = json!({"buckets": [{"key": 1525132800000_i64, "doc_count": 1}]});
        let ts = Timeseries::from_aggregation(&agg, 0).unwrap();
        assert_eq!(ts.points[0].date, NaiveDate::from_ymd_opt(2018, 5, 1).unwrap());
    }

    #[test]
    fn test_no_buckets() {
        let err = Timeseries::from_aggregation(&json!({"value": 3}), 0).unwrap_err();
        assert!(matches!(err, QueryError::NoBuckets));
    }

    #[test]
    fn test_trend() {
        let mut ts = Timeseries::from_aggregation(&histogram(), 0).unwrap();
        ts.points.truncate(2);

        // 7 -> 2: (2 - 7) / 2 = -250%
        assert_eq!(
            ts.trend(),
            Some(Trend {
                last: 2.0,
                percentage: -250
            })
        );

        let ts = Timeseries::from_aggregation(&histogram(), 0).unwrap();
        // 2 -> 0 with last == 0
        assert_eq!(ts.trend().unwrap().percentage, -100);

        assert!(Timeseries::default().trend().is_none());
    }

    #[test]
    fn test_ratio() {
        let closed = Timeseries::from_aggregation(&histogram(), 0).unwrap();
        let opened = Timeseries::from_aggregation(&histogram(), 1).unwrap();

        let bmi = Timeseries::ratio(&closed, &opened);
        let values = bmi.values();
        assert!((values[0].unwrap() - 7.0 / 12.0).abs() < 1e-9);
        assert!((values[1].unwrap() - 2.0 / 3.0).abs() < 1e-9);
        // zero denominator
        assert_eq!(values[2], None);
    }

    #[test]
    fn test_single_value() {
        let response = json!({
            "hits": {"total": {"value": 1208, "relation": "eq"}, "hits": []},
            "aggregations": {"0": {"value": 19.0}}
        });
        assert_eq!(single_value(&response, "0").unwrap(), Some(19.0));
        // Unknown aggregation falls back to the hit total
        assert_eq!(single_value(&response, "1").unwrap(), Some(1208.0));
    }

    #[test]
    fn test_single_value_percentiles() {
        let response = json!({
            "hits": {"total": 10, "hits": []},
            "aggregations": {"0": {"values": {"50.0": 4.0}}, "1": {"values": {"25.0": 1.0}}}
        });
        assert_eq!(single_value(&response, "0").unwrap(), Some(4.0));
        assert!(matches!(
            single_value(&response, "1"),
            Err(QueryError::UnsupportedMultiValue)
        ));
    }

    #[test]
    fn test_hit_total_forms() {
        assert_eq!(hit_total(&json!({"hits": {"total": 5}})).unwrap(), 5.0);
        assert_eq!(hit_total(&json!({"hits": {"total": {"value": 6}}})).unwrap(), 6.0);
        assert!(hit_total(&json!({})).is_err());
    }

    #[test]
    fn test_term_buckets() {
        let agg = json!({
            "buckets": [
                {"key": "Alice", "doc_count": 40, "0": {"value": 38.0}},
                {"key": 42, "doc_count": 2}
            ]
        });
        let buckets = term_buckets(&agg, 0).unwrap();

        assert_eq!(buckets[0].key, "Alice");
        assert_eq!(buckets[0].doc_count, 40);
        assert_eq!(buckets[0].value, Some(38.0));
        assert_eq!(buckets[1].key, "42");
        assert_eq!(buckets[1].value, None);
    }
}
