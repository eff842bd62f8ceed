//! Git Metrics
//!
//! Metrics computed from a git enriched index: one document per commit,
//! identified by `hash`, attributed to `author_uuid` / `author_name` and
//! `author_org_name`.

use super::Metric;
use crate::elastic::Index;
use crate::query::{Query, QueryResult, TermBucket, Timeseries};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Number of distinct commits per period
#[derive(Debug, Clone)]
pub struct Commits {
    query: Query,
}

impl Commits {
    pub fn new(index: &Index) -> QueryResult<Self> {
        let query = Query::new(index).get_cardinality("hash")?.by_period()?;
        Ok(Self { query })
    }
}

#[async_trait]
impl Metric for Commits {
    fn id(&self) -> &str {
        "commits"
    }

    fn name(&self) -> &str {
        "Commits"
    }

    fn description(&self) -> &str {
        "Changes to the source code"
    }

    fn request_body(&self) -> Option<Value> {
        Some(self.query.build_aggregation_request())
    }

    async fn timeseries(&self) -> QueryResult<Timeseries> {
        let mut query = self.query.clone();
        query.get_timeseries().await
    }
}

/// Number of distinct commit authors per period
#[derive(Debug, Clone)]
pub struct Authors {
    query: Query,
}

impl Authors {
    pub fn new(index: &Index) -> QueryResult<Self> {
        let query = Query::new(index)
            .get_cardinality("author_uuid")?
            .by_period()?;
        Ok(Self { query })
    }
}

#[async_trait]
impl Metric for Authors {
    fn id(&self) -> &str {
        "authors"
    }

    fn name(&self) -> &str {
        "Authors"
    }

    fn description(&self) -> &str {
        "People authoring commits (changes to source code)"
    }

    fn request_body(&self) -> Option<Value> {
        Some(self.query.build_aggregation_request())
    }

    async fn timeseries(&self) -> QueryResult<Timeseries> {
        let mut query = self.query.clone();
        query.get_timeseries().await
    }
}

/// Metrics of the overview section: `activity` (commits) and `author`
pub async fn overview(index: &Index) -> QueryResult<BTreeMap<&'static str, Timeseries>> {
    let mut results = BTreeMap::new();
    results.insert("activity", Commits::new(index)?.timeseries().await?);
    results.insert("author", Authors::new(index)?.timeseries().await?);
    Ok(results)
}

/// Metrics of the project activity section: `commits` and `authors`
pub async fn project_activity(index: &Index) -> QueryResult<BTreeMap<&'static str, Timeseries>> {
    let mut results = BTreeMap::new();
    results.insert("commits", Commits::new(index)?.timeseries().await?);
    results.insert("authors", Authors::new(index)?.timeseries().await?);
    Ok(results)
}

/// Authors over time and the most active people and organizations
#[derive(Debug, Clone, Serialize)]
pub struct CommunityReport {
    pub authors: Timeseries,
    pub top_authors: Vec<TermBucket>,
    pub top_organizations: Vec<TermBucket>,
}

/// Metrics of the project community section.
///
/// Top lists rank by number of distinct commits and keep `top` entries.
pub async fn project_community(index: &Index, top: usize) -> QueryResult<CommunityReport> {
    let authors = Authors::new(index)?.timeseries().await?;

    let top_authors = Query::new(index)
        .get_cardinality("hash")?
        .by_authors(Some("author_name"))?
        .get_list()
        .await?;

    let top_organizations = Query::new(index)
        .get_cardinality("hash")?
        .by_organizations(None)?
        .get_list()
        .await?;

    Ok(CommunityReport {
        authors,
        top_authors: rank(top_authors, top),
        top_organizations: rank(top_organizations, top),
    })
}

fn rank(mut buckets: Vec<TermBucket>, top: usize) -> Vec<TermBucket> {
    buckets.sort_by(|a, b| {
        let (va, vb) = (a.value.unwrap_or(0.0), b.value.unwrap_or(0.0));
        vb.total_cmp(&va).then_with(|| a.key.cmp(&b.key))
    });
    buckets.truncate(top);
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::testing::index_with;
    use crate::query::{Aggregation, Interval};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn buckets_response(values: &[f64]) -> Value {
        let buckets: Vec<Value> = values
            .iter()
            .map(|v| {
                json!({
                    "key_as_string": "2018-06-01T00:00:00.000Z",
                    "key": 1527811200000_i64,
                    "doc_count": 1,
                    "0": {"value": v}
                })
            })
            .collect();
        json!({"hits": {"total": 1, "hits": []}, "aggregations": {"0": {"buckets": buckets}}})
    }

    fn terms_response(entries: &[(&str, f64)]) -> Value {
        let buckets: Vec<Value> = entries
            .iter()
            .map(|(k, v)| json!({"key": k, "doc_count": *v as u64, "0": {"value": v}}))
            .collect();
        json!({"hits": {"total": 1, "hits": []}, "aggregations": {"0": {"buckets": buckets}}})
    }

    #[test]
    fn test_commits_request() {
        let (index, _) = index_with(vec![]);
        let commits = Commits::new(&index).unwrap();

        let mut histogram = Aggregation::date_histogram("grimoire_creation_date", Interval::Month);
        histogram.metric("0", Aggregation::cardinality("hash"));

        assert_eq!(
            commits.request_body().unwrap(),
            json!({
                "query": {"match_all": {}},
                "size": 0,
                "aggs": {"0": histogram.to_json()}
            })
        );
    }

    #[test]
    fn test_authors_descriptor() {
        let (index, _) = index_with(vec![]);
        let authors = Authors::new(&index).unwrap();

        assert_eq!(authors.id(), "authors");
        assert_eq!(
            authors.descriptor().description,
            "People authoring commits (changes to source code)"
        );
        assert_eq!(
            authors.request_body().unwrap()["aggs"]["0"]["aggs"]["0"]["cardinality"]["field"],
            "author_uuid"
        );
    }

    #[tokio::test]
    async fn test_timeseries_can_be_repeated() {
        let (index, backend) = index_with(vec![buckets_response(&[3.0]), buckets_response(&[3.0])]);
        let commits = Commits::new(&index).unwrap();

        let first = commits.timeseries().await.unwrap();
        let second = commits.timeseries().await.unwrap();

        assert_eq!(first, second);
        let requests = backend.requests();
        assert_eq!(requests[0].1, requests[1].1);
    }

    #[tokio::test]
    async fn test_overview() {
        let (index, backend) = index_with(vec![buckets_response(&[12.0]), buckets_response(&[3.0])]);

        let results = overview(&index).await.unwrap();

        assert_eq!(results["activity"].values(), vec![Some(12.0)]);
        assert_eq!(results["author"].values(), vec![Some(3.0)]);
        let requests = backend.requests();
        assert_eq!(
            requests[1].1["aggs"]["0"]["aggs"]["0"]["cardinality"]["field"],
            "author_uuid"
        );
    }

    #[tokio::test]
    async fn test_project_community() {
        let (index, backend) = index_with(vec![
            buckets_response(&[2.0]),
            terms_response(&[("Bob", 3.0), ("Alice", 40.0), ("Carol", 3.0)]),
            terms_response(&[("Bitergia", 30.0), ("others", 13.0)]),
        ]);

        let report = project_community(&index, 2).await.unwrap();

        assert_eq!(report.authors.values(), vec![Some(2.0)]);
        let names: Vec<&str> = report.top_authors.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(report.top_organizations[0].key, "Bitergia");

        let requests = backend.requests();
        assert_eq!(
            requests[1].1["aggs"]["0"]["terms"],
            json!({"field": "author_name", "size": 10000, "missing": "others"})
        );
        assert_eq!(
            requests[2].1["aggs"]["0"]["terms"]["field"],
            "author_org_name"
        );
    }
}
