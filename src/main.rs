//! Manuscripts CLI
//!
//! Command-line interface for computing activity metrics:
//! - Git overview and community reports
//! - Issue dashboard sections
//! - Single metrics, counts and dry-run requests
//! - Cluster health and config generation

use anyhow::{bail, Context as _};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use manuscripts::config::{generate_default_config, Config, LoggingConfig};
use manuscripts::elastic::{ElasticClient, Index};
use manuscripts::metrics::{self, git, github_issues, MetricResult, SectionValue};
use manuscripts::query::{Interval, Query, Timeseries};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "manuscripts")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Development activity metrics from enriched indexes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Elasticsearch URL, overrides the config file
    #[arg(long, global = true)]
    pub es_url: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

/// Index and period selection shared by the query commands
#[derive(Args, Clone, Default)]
pub struct RangeArgs {
    /// Index to query (default: from config)
    #[arg(short, long)]
    pub index: Option<String>,

    /// Start date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub since: Option<String>,

    /// End date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub until: Option<String>,

    /// Histogram interval (minute, hour, day, week, month, quarter, year)
    #[arg(long)]
    pub interval: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Commits and authors per period
    Overview {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Authors per period plus top authors and organizations
    Community {
        #[command(flatten)]
        range: RangeArgs,
        /// Entries in each top list (default: from config)
        #[arg(short, long)]
        top: Option<usize>,
    },

    /// Issue metrics by dashboard section
    Sections {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Compute a single metric
    Metric {
        /// Metric id (commits, authors, opened, closed, bmi, days_to_close_median)
        id: String,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Count distinct values of a field
    Count {
        /// Field name
        field: String,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Print the search request of a metric without sending it
    Request {
        /// Metric id
        id: String,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Show cluster health
    Health,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, loaded) = match &cli.config {
        Some(path) => (Config::load_with_env(path)?, None),
        None => {
            let loaded = Config::load_default();
            (loaded.config.clone(), Some(loaded))
        }
    };
    if let Some(url) = &cli.es_url {
        config.elasticsearch.url = url.clone();
    }

    init_logging(&config.logging)?;
    if let Some(loaded) = &loaded {
        loaded.log();
    }

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &content)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let client = Arc::new(ElasticClient::new(config.elasticsearch.to_client_config())?);
    let json = cli.format == "json";

    match cli.command {
        Commands::Overview { range } => {
            let index = open_index(&client, &config, &config.indexes.git, &range)?;
            tracing::info!(index = index.name(), "Computing overview");

            let results = git::overview(&index).await?;
            if json {
                print_json(&results)?;
            } else {
                for (name, ts) in &results {
                    println!("{}", name);
                    print_timeseries(ts);
                    println!();
                }
            }
        }

        Commands::Community { range, top } => {
            let index = open_index(&client, &config, &config.indexes.git, &range)?;
            let top = top.unwrap_or(config.query.top_size);
            tracing::info!(index = index.name(), top, "Computing community report");

            let report = git::project_community(&index, top).await?;
            if json {
                print_json(&report)?;
            } else {
                println!("authors");
                print_timeseries(&report.authors);
                println!();
                println!("top authors");
                print_ranking(&report.top_authors);
                println!();
                println!("top organizations");
                print_ranking(&report.top_organizations);
            }
        }

        Commands::Sections { range } => {
            let index = open_index(&client, &config, &config.indexes.github_issues, &range)?;
            tracing::info!(index = index.name(), "Computing sections");

            let sections = github_issues::section_metrics(&index)?;
            let report = metrics::evaluate_sections(&sections).await?;
            if json {
                print_json(&report)?;
            } else {
                print_sections(&report);
            }
        }

        Commands::Metric { id, range } => {
            let index = open_index(&client, &config, default_index(&config, &id), &range)?;
            let Some(metric) = metrics::by_id(&id, &index)? else {
                bail!(unknown_metric(&id));
            };

            let results = metrics::evaluate(&[metric]).await?;
            if json {
                print_json(&results)?;
            } else {
                for result in &results {
                    print_metric(result);
                }
            }
        }

        Commands::Count { field, range } => {
            let index = open_index(&client, &config, &config.indexes.git, &range)?;
            let count = Query::new(&index)
                .get_cardinality(&field)?
                .get_aggs()
                .await?;

            if json {
                print_json(&serde_json::json!({ "field": field, "count": count }))?;
            } else {
                println!("{}: {}", field, format_value(count));
            }
        }

        Commands::Request { id, range } => {
            let index = open_index(&client, &config, default_index(&config, &id), &range)?;
            let Some(metric) = metrics::by_id(&id, &index)? else {
                bail!(unknown_metric(&id));
            };

            match metric.request_body() {
                Some(body) => {
                    println!("POST /{}/_search", index.name());
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                None => bail!("Metric {} combines several requests", id),
            }
        }

        Commands::Health => {
            let health = client.health_check().await.with_context(|| {
                format!(
                    "Cannot connect to Elasticsearch at {}",
                    client.config().base_url
                )
            })?;

            if json {
                print_json(&health)?;
            } else {
                println!("Manuscripts v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Cluster: {}", health["cluster_name"].as_str().unwrap_or("unknown"));
                println!("Status: {}", health["status"].as_str().unwrap_or("unknown"));
                if let Some(nodes) = health["number_of_nodes"].as_u64() {
                    println!("Nodes: {}", nodes);
                }
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("manuscripts={}", config.level)));

    let writer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init();
    }

    Ok(())
}

fn open_index(
    client: &Arc<ElasticClient>,
    config: &Config,
    default_name: &str,
    range: &RangeArgs,
) -> anyhow::Result<Index> {
    let mut defaults = config.query.to_defaults();
    if let Some(interval) = &range.interval {
        defaults.interval = interval.parse::<Interval>()?;
    }
    defaults.since = range.since.as_deref().map(parse_date).transpose()?;
    defaults.until = range.until.as_deref().map(parse_date).transpose()?;

    let name = range.index.as_deref().unwrap_or(default_name);
    Ok(Index::new(name, client.clone()).with_defaults(defaults))
}

/// Git metrics run on the git index, everything else on the issues index
fn default_index<'a>(config: &'a Config, id: &str) -> &'a str {
    match id {
        "commits" | "authors" => &config.indexes.git,
        _ => &config.indexes.github_issues,
    }
}

fn unknown_metric(id: &str) -> String {
    format!(
        "Unknown metric: {}. Available: {}",
        id,
        metrics::METRIC_IDS.join(", ")
    )
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or RFC 3339
fn parse_date(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {}. Use YYYY-MM-DD or RFC 3339", s))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{:.0}", v),
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

fn print_timeseries(ts: &Timeseries) {
    if ts.is_empty() {
        println!("No data for the selected period");
        return;
    }

    println!("{:<12} | {:<10}", "Date", "Value");
    println!("{}", "-".repeat(25));
    for point in &ts.points {
        println!("{:<12} | {:<10}", point.date, format_value(point.value));
    }
}

fn print_ranking(buckets: &[manuscripts::TermBucket]) {
    println!("{:<30} {:>10}", "Name", "Commits");
    println!("{}", "-".repeat(41));
    for bucket in buckets {
        println!("{:<30} {:>10}", bucket.key, format_value(bucket.value));
    }
}

fn print_metric(result: &MetricResult) {
    let trend = result
        .trend
        .map(|t| format!(" (last {}, {:+}%)", format_value(Some(t.last)), t.percentage))
        .unwrap_or_default();
    println!(
        "{} [{}]: {}{}",
        result.descriptor.name, result.descriptor.id, result.descriptor.description, trend
    );
    print_timeseries(&result.timeseries);
    println!();
}

fn print_sections(report: &BTreeMap<&'static str, BTreeMap<&'static str, SectionValue>>) {
    for (section, entries) in report {
        println!("== {} ==", section);
        for (name, value) in entries {
            match value {
                SectionValue::Title(title) => println!("{}: {}", name, title),
                SectionValue::Metrics(results) if results.is_empty() => {}
                SectionValue::Metrics(results) => {
                    println!("{}:", name);
                    for result in results {
                        print_metric(result);
                    }
                }
            }
        }
        println!();
    }
}
