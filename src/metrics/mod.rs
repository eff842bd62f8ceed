//! Activity Metrics
//!
//! Named metrics computed from enriched indexes:
//! - git (commits, authors)
//! - GitHub issues (opened, closed, BMI, days to close)
//!
//! Every metric is described by an id, a display name and a description,
//! and produces a time series. Dashboards group metrics into sections
//! (see [`Section`]).

pub mod git;
pub mod github_issues;

use crate::elastic::Index;
use crate::query::{QueryResult, Timeseries, Trend};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Ids accepted by [`by_id`]
pub const METRIC_IDS: &[&str] = &[
    "commits",
    "authors",
    "opened",
    "closed",
    "bmi",
    "days_to_close_median",
];

/// Common trait for all metrics
#[async_trait]
pub trait Metric: Send + Sync {
    /// Stable identifier
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// What the metric measures
    fn description(&self) -> &str;

    fn descriptor(&self) -> MetricDescriptor {
        MetricDescriptor {
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }

    /// Search request the metric sends, when it maps to a single query
    fn request_body(&self) -> Option<Value> {
        None
    }

    /// Compute the metric per period
    async fn timeseries(&self) -> QueryResult<Timeseries>;
}

/// Id, name and description of a metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// A computed metric
#[derive(Debug, Clone, Serialize)]
pub struct MetricResult {
    #[serde(flatten)]
    pub descriptor: MetricDescriptor,
    pub timeseries: Timeseries,
    pub trend: Option<Trend>,
}

/// Compute every metric in `metrics`, in order
pub async fn evaluate(metrics: &[Box<dyn Metric>]) -> QueryResult<Vec<MetricResult>> {
    let mut results = Vec::with_capacity(metrics.len());
    for metric in metrics {
        tracing::debug!(metric = metric.id(), "Computing metric");
        let timeseries = metric.timeseries().await?;
        results.push(MetricResult {
            descriptor: metric.descriptor(),
            trend: timeseries.trend(),
            timeseries,
        });
    }
    Ok(results)
}

/// Look up a metric by id on `index`
pub fn by_id(id: &str, index: &Index) -> QueryResult<Option<Box<dyn Metric>>> {
    use github_issues::{ClosedIssues, DaysToCloseMedian, IssuesBmi, OpenIssues};

    let metric: Box<dyn Metric> = match id {
        "commits" => Box::new(git::Commits::new(index)?),
        "authors" => Box::new(git::Authors::new(index)?),
        "opened" => Box::new(OpenIssues::new(index)?),
        "closed" => Box::new(ClosedIssues::new(index)?),
        "bmi" => Box::new(IssuesBmi::new(index)?),
        "days_to_close_median" => Box::new(DaysToCloseMedian::new(index)?),
        _ => return Ok(None),
    };
    Ok(Some(metric))
}

// ============================================
// Sections
// ============================================

/// A dashboard section: named metric lists plus named titles
#[derive(Default)]
pub struct Section {
    pub metrics: BTreeMap<&'static str, Vec<Box<dyn Metric>>>,
    pub titles: BTreeMap<&'static str, String>,
}

/// Sections by name
pub type Sections = BTreeMap<&'static str, Section>;

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a metric list
    pub fn metrics(mut self, name: &'static str, metrics: Vec<Box<dyn Metric>>) -> Self {
        self.metrics.insert(name, metrics);
        self
    }

    /// Builder: add a title
    pub fn title(mut self, name: &'static str, title: impl Into<String>) -> Self {
        self.titles.insert(name, title.into());
        self
    }

    /// Ids of the metrics in list `name`
    pub fn metric_ids(&self, name: &str) -> Vec<&str> {
        self.metrics
            .get(name)
            .map(|list| list.iter().map(|m| m.id()).collect())
            .unwrap_or_default()
    }
}

/// Entry of a computed section
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SectionValue {
    Metrics(Vec<MetricResult>),
    Title(String),
}

/// Compute every metric of every section
pub async fn evaluate_sections(
    sections: &Sections,
) -> QueryResult<BTreeMap<&'static str, BTreeMap<&'static str, SectionValue>>> {
    let mut report = BTreeMap::new();

    for (section_name, section) in sections {
        let mut entries = BTreeMap::new();
        for (list_name, metrics) in &section.metrics {
            entries.insert(*list_name, SectionValue::Metrics(evaluate(metrics).await?));
        }
        for (title_name, title) in &section.titles {
            entries.insert(*title_name, SectionValue::Title(title.clone()));
        }
        report.insert(*section_name, entries);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::testing::index_with;
    use serde_json::json;

    fn histogram_response(values: &[f64]) -> Value {
        let buckets: Vec<Value> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                json!({
                    "key_as_string": format!("2018-0{}-01T00:00:00.000Z", i + 1),
                    "key": 1514764800000_i64 + i as i64 * 2678400000,
                    "doc_count": 10,
                    "0": {"value": v}
                })
            })
            .collect();
        json!({"hits": {"total": 10, "hits": []}, "aggregations": {"0": {"buckets": buckets}}})
    }

    #[test]
    fn test_by_id_catalog() {
        let (index, _) = index_with(vec![]);
        for id in METRIC_IDS {
            let metric = by_id(id, &index).unwrap().unwrap();
            assert_eq!(metric.id(), *id);
            assert!(!metric.name().is_empty());
            assert!(!metric.description().is_empty());
        }
        assert!(by_id("stars", &index).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_evaluate() {
        let (index, _) = index_with(vec![histogram_response(&[4.0, 8.0])]);
        let metrics: Vec<Box<dyn Metric>> = vec![Box::new(git::Commits::new(&index).unwrap())];

        let results = evaluate(&metrics).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].descriptor.id, "commits");
        assert_eq!(results[0].timeseries.values(), vec![Some(4.0), Some(8.0)]);
        assert_eq!(
            results[0].trend,
            Some(Trend {
                last: 8.0,
                percentage: 50
            })
        );
    }

    #[tokio::test]
    async fn test_evaluate_sections() {
        let (index, _) = index_with(vec![histogram_response(&[1.0])]);
        let mut sections = Sections::new();
        sections.insert(
            "overview",
            Section::new()
                .metrics("activity_metrics", vec![Box::new(git::Commits::new(&index).unwrap())])
                .metrics("author_metrics", vec![])
                .title("title", "Overview"),
        );

        let report = evaluate_sections(&sections).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["overview"]["activity_metrics"][0]["id"], "commits");
        assert_eq!(json["overview"]["activity_metrics"][0]["name"], "Commits");
        assert_eq!(json["overview"]["author_metrics"], json!([]));
        assert_eq!(json["overview"]["title"], "Overview");
    }
}
