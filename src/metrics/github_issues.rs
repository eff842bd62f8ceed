//! GitHub Issues Metrics
//!
//! The GitHub enriched index stores issues and pull requests together;
//! `pull_request` tells them apart. Every metric here works on issues only.

use super::{Metric, Section, Sections};
use crate::elastic::Index;
use crate::query::{PeriodOptions, Query, QueryResult, Timeseries};
use async_trait::async_trait;
use serde_json::Value;

/// Query restricted to issues
pub fn issues(index: &Index) -> Query {
    Query::new(index).add_query("pull_request", false)
}

/// Query restricted to pull requests
pub fn pull_requests(index: &Index) -> Query {
    Query::new(index).add_query("pull_request", true)
}

/// Issues opened per period
#[derive(Debug, Clone)]
pub struct OpenIssues {
    query: Query,
}

impl OpenIssues {
    pub fn new(index: &Index) -> QueryResult<Self> {
        let query = issues(index).get_cardinality("id")?.by_period()?;
        Ok(Self { query })
    }
}

#[async_trait]
impl Metric for OpenIssues {
    fn id(&self) -> &str {
        "opened"
    }

    fn name(&self) -> &str {
        "Opened tickets"
    }

    fn description(&self) -> &str {
        "Number of opened tickets"
    }

    fn request_body(&self) -> Option<Value> {
        Some(self.query.build_aggregation_request())
    }

    async fn timeseries(&self) -> QueryResult<Timeseries> {
        let mut query = self.query.clone();
        query.get_timeseries().await
    }
}

/// Issues in closed state per period
#[derive(Debug, Clone)]
pub struct ClosedIssues {
    query: Query,
}

impl ClosedIssues {
    pub fn new(index: &Index) -> QueryResult<Self> {
        let query = issues(index)
            .is_closed()
            .get_cardinality("id")?
            .by_period()?;
        Ok(Self { query })
    }
}

#[async_trait]
impl Metric for ClosedIssues {
    fn id(&self) -> &str {
        "closed"
    }

    fn name(&self) -> &str {
        "Closed tickets"
    }

    fn description(&self) -> &str {
        "Number of closed tickets"
    }

    fn request_body(&self) -> Option<Value> {
        Some(self.query.build_aggregation_request())
    }

    async fn timeseries(&self) -> QueryResult<Timeseries> {
        let mut query = self.query.clone();
        query.get_timeseries().await
    }
}

/// Backlog management index: closed tickets over opened tickets per period.
///
/// Combines two requests, so it has no single request body.
#[derive(Debug, Clone)]
pub struct IssuesBmi {
    opened: OpenIssues,
    closed: ClosedIssues,
}

impl IssuesBmi {
    pub fn new(index: &Index) -> QueryResult<Self> {
        Ok(Self {
            opened: OpenIssues::new(index)?,
            closed: ClosedIssues::new(index)?,
        })
    }
}

#[async_trait]
impl Metric for IssuesBmi {
    fn id(&self) -> &str {
        "bmi"
    }

    fn name(&self) -> &str {
        "Backlog Management Index"
    }

    fn description(&self) -> &str {
        "Closed tickets divided by opened tickets"
    }

    async fn timeseries(&self) -> QueryResult<Timeseries> {
        let closed = self.closed.timeseries().await?;
        let opened = self.opened.timeseries().await?;
        Ok(Timeseries::ratio(&closed, &opened))
    }
}

/// Median days to close, bucketed by closing date
#[derive(Debug, Clone)]
pub struct DaysToCloseMedian {
    query: Query,
}

impl DaysToCloseMedian {
    pub fn new(index: &Index) -> QueryResult<Self> {
        let query = issues(index)
            .is_closed()
            .get_percentiles("time_to_close_days")?
            .by_period_with(PeriodOptions::new().field("closed_at"))?;
        Ok(Self { query })
    }
}

#[async_trait]
impl Metric for DaysToCloseMedian {
    fn id(&self) -> &str {
        "days_to_close_median"
    }

    fn name(&self) -> &str {
        "Days to close (median)"
    }

    fn description(&self) -> &str {
        "Median number of days to close a ticket"
    }

    fn request_body(&self) -> Option<Value> {
        Some(self.query.build_aggregation_request())
    }

    async fn timeseries(&self) -> QueryResult<Timeseries> {
        let mut query = self.query.clone();
        query.get_timeseries().await
    }
}

/// Issue metrics laid out by dashboard section
pub fn section_metrics(index: &Index) -> QueryResult<Sections> {
    let mut sections = Sections::new();

    sections.insert(
        "overview",
        Section::new()
            .metrics(
                "activity_metrics",
                vec![
                    Box::new(OpenIssues::new(index)?),
                    Box::new(ClosedIssues::new(index)?),
                ],
            )
            .metrics("author_metrics", vec![])
            .metrics("bmi_metrics", vec![Box::new(IssuesBmi::new(index)?)])
            .metrics(
                "time_to_close_metrics",
                vec![Box::new(DaysToCloseMedian::new(index)?)],
            )
            .metrics("projects_metrics", vec![]),
    );

    sections.insert(
        "com_channels",
        Section::new()
            .metrics("activity_metrics", vec![])
            .metrics("author_metrics", vec![]),
    );

    sections.insert("project_activity", Section::new().metrics("metrics", vec![]));

    sections.insert(
        "project_community",
        Section::new()
            .metrics("author_metrics", vec![])
            .metrics("people_top_metrics", vec![])
            .metrics("orgs_top_metrics", vec![]),
    );

    sections.insert(
        "project_process",
        Section::new()
            .metrics("bmi_metrics", vec![Box::new(IssuesBmi::new(index)?)])
            .metrics(
                "time_to_close_metrics",
                vec![Box::new(DaysToCloseMedian::new(index)?)],
            )
            .title("time_to_close_title", "Days to close (median and average)")
            .metrics("time_to_close_review_metrics", vec![])
            .title("time_to_close_review_title", "")
            .metrics("patchsets_metrics", vec![]),
    );

    Ok(sections)
}
