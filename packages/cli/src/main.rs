#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal front end for the traffic incident dashboard.
//!
//! ```text
//! crashlens incidents [--bbox w,s,e,n] [--criticality major] [--search bridge]
//! crashlens analytics [--bbox w,s,e,n] [--local]
//! crashlens flow [--bbox w,s,e,n] [--max-points 100]
//! crashlens risk --lat 36.16 --lon -86.78 [--radius 5000]
//! crashlens watch [--bbox w,s,e,n] [--sort time]
//! crashlens health
//! ```
//!
//! Every data command goes through the same [`QueryScheduler`] the live
//! `watch` session uses, so TTLs, deduplication and timeouts behave the
//! same way in one-shot and live modes.

mod render;
mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use crashlens_cli_utils::{MultiProgress, Spinner};
use crashlens_client::{DashboardApi, HttpDashboardApi};
use crashlens_config::{ConfigError, DashboardConfig};
use crashlens_incident_models::{Criticality, risk::RiskRequest};
use crashlens_pipeline::{FilterCriteria, LengthBucket, SortKey};
use crashlens_sync::{CacheEntry, QueryKey, QueryScheduler, SchedulerConfig};
use crashlens_viewport::{BoundingBox, Canonicalizer, Viewport, parse_bbox};

#[derive(Parser)]
#[command(
    name = "crashlens",
    version,
    about = "Viewport-driven traffic incident dashboard"
)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List incidents in a viewport
    Incidents(ViewArgs),
    /// Show the analytics summary
    Analytics {
        /// Viewport as west,south,east,north (whole area if omitted)
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,
        /// Aggregate the viewport's incidents locally instead of asking the server
        #[arg(long)]
        local: bool,
        /// Period label for local aggregates
        #[arg(long, default_value = crashlens_analytics_models::DEFAULT_PERIOD)]
        period: String,
    },
    /// Show traffic flow samples
    Flow {
        /// Viewport as west,south,east,north
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,
        /// Maximum number of samples
        #[arg(long)]
        max_points: Option<u32>,
    },
    /// Assess incident risk around a point
    Risk {
        /// Latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Radius in meters
        #[arg(long)]
        radius: Option<u32>,
    },
    /// Follow a viewport live until Ctrl-C
    Watch(ViewArgs),
    /// Check backend health
    Health,
}

#[derive(Args)]
struct ViewArgs {
    /// Viewport as west,south,east,north
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Only this criticality (critical, major, minor, low)
    #[arg(long)]
    criticality: Option<Criticality>,

    /// Case-insensitive text search
    #[arg(long, default_value = "")]
    search: String,

    /// Length bucket (all, short, medium, long)
    #[arg(long, default_value = "all")]
    length: LengthBucket,

    /// Sort key (severity, time, length)
    #[arg(long, default_value = "severity")]
    sort: SortKey,
}

impl ViewArgs {
    fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            search: self.search.clone(),
            criticality: self.criticality,
            length: self.length,
        }
    }
}

/// Errors reported by the CLI itself.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// A query finished without data.
    #[error("Failed to load {key}: {message}")]
    Fetch { key: String, message: String },
}

/// Shared handles for one invocation.
struct App {
    config: DashboardConfig,
    api: Arc<dyn DashboardApi>,
    scheduler: QueryScheduler,
    canonicalizer: Canonicalizer,
    multi: MultiProgress,
}

impl App {
    fn new(
        config: DashboardConfig,
        multi: MultiProgress,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let api: Arc<dyn DashboardApi> = Arc::new(HttpDashboardApi::new(&config.api)?);
        let scheduler = QueryScheduler::new(Arc::clone(&api), scheduler_config(&config)?);
        let canonicalizer = Canonicalizer::new(config.sync.bbox_precision);

        Ok(Self {
            config,
            api,
            scheduler,
            canonicalizer,
            multi,
        })
    }

    /// Canonical box for `bbox`, or the configured default.
    fn viewport(
        &self,
        bbox: Option<BoundingBox>,
    ) -> Result<BoundingBox, Box<dyn std::error::Error>> {
        let bbox = bbox.unwrap_or(self.scheduler.config().default_bbox);
        Ok(self.canonicalizer.canonicalize(Viewport::from(bbox))?)
    }

    /// Fetches `key` behind a spinner and fails if no data came back.
    async fn load(&self, key: &QueryKey, message: &str) -> Result<CacheEntry, CliError> {
        let spinner = Spinner::start(&self.multi, message);
        let entry = self.scheduler.fetch(key).await;
        spinner.clear();

        if entry.data.is_none() {
            return Err(CliError::Fetch {
                key: key.to_string(),
                message: entry.error.unwrap_or_else(|| "no data".to_string()),
            });
        }
        if let Some(error) = &entry.error {
            log::warn!("Showing cached data for {key}: {error}");
        }
        Ok(entry)
    }

    async fn incidents(&self, args: &ViewArgs) -> Result<(), Box<dyn std::error::Error>> {
        let bbox = self.viewport(args.bbox)?;
        let key = QueryKey::incidents(&bbox, args.criticality);
        let entry = self.load(&key, "Fetching incidents...").await?;
        let incidents = entry
            .incidents()
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()));

        let shown = crashlens_pipeline::apply(&incidents, &args.criteria(), args.sort);
        let shown: Vec<_> = shown.into_iter().cloned().collect();

        println!("{}", render::freshness_line(&entry));
        println!("{}", render::stats_line(&crashlens_analytics::stats(incidents.iter())));
        println!();
        print!("{}", render::incident_table(&shown));
        println!("\n{} of {} incident(s) shown", shown.len(), incidents.len());
        Ok(())
    }

    async fn analytics(
        &self,
        bbox: Option<BoundingBox>,
        local: bool,
        period: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let summary = if local {
            let bbox = self.viewport(bbox)?;
            let entry = self
                .load(&QueryKey::incidents(&bbox, None), "Fetching incidents...")
                .await?;
            let incidents = entry
                .incidents()
                .cloned()
                .unwrap_or_else(|| Arc::from(Vec::new()));
            crashlens_analytics::aggregate(incidents.iter(), period)
        } else {
            let bbox = bbox.map(|b| self.viewport(Some(b))).transpose()?;
            let key = QueryKey::analytics_summary(bbox.as_ref());
            let entry = self.load(&key, "Fetching analytics...").await?;
            entry
                .data
                .as_ref()
                .and_then(crashlens_sync::Payload::analytics_summary)
                .map(|summary| summary.as_ref().clone())
                .unwrap_or_default()
        };

        print!("{}", render::summary_table(&summary));
        Ok(())
    }

    async fn flow(
        &self,
        bbox: Option<BoundingBox>,
        max_points: Option<u32>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let bbox = self.viewport(bbox)?;
        let max_points = max_points.unwrap_or(self.config.api.max_flow_points);
        let key = QueryKey::traffic_flow(&bbox, max_points);
        let entry = self.load(&key, "Fetching traffic flow...").await?;

        println!("{}", render::freshness_line(&entry));
        if let Some(flow) = entry
            .data
            .as_ref()
            .and_then(crashlens_sync::Payload::traffic_flow) {
            println!("{}", render::flow_line(flow));
        }
        Ok(())
    }

    async fn risk(
        &self,
        lat: f64,
        lon: f64,
        radius: Option<u32>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request = RiskRequest {
            latitude: lat,
            longitude: lon,
            radius: radius.unwrap_or(self.config.api.risk_radius_m),
        };
        let spinner = Spinner::start(&self.multi, "Analyzing risk...");
        let result = self.api.risk_analysis(request).await;
        spinner.clear();

        println!("{}", render::risk_report(&result?, self.config.risk));
        Ok(())
    }

    async fn health(&self) -> Result<(), Box<dyn std::error::Error>> {
        let spinner = Spinner::start(&self.multi, "Checking health...");
        let result = self.api.health().await;
        spinner.clear();

        let report = result?;
        print!("{}", render::health_report(&report));
        if !report.is_healthy() {
            log::warn!("Backend reports status '{}'", report.status);
        }
        Ok(())
    }
}

fn scheduler_config(config: &DashboardConfig) -> Result<SchedulerConfig, ConfigError> {
    let sync = &config.sync;
    Ok(SchedulerConfig {
        incident_ttl: sync.incident_ttl(),
        flow_ttl: sync.flow_ttl(),
        analytics_ttl: sync.analytics_ttl(),
        fetch_timeout: sync.fetch_timeout(),
        max_entries: sync.max_entries,
        ..SchedulerConfig::new(config.map.default_bbox()?)
    })
}

fn load_config(cli: &Cli) -> Result<DashboardConfig, ConfigError> {
    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.api_url {
        config.api.base_url.clone_from(url);
        config.validate()?;
    }
    log::debug!("Using API at {}", config.api.base_url);
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = crashlens_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let app = App::new(config, multi)?;

    match cli.command {
        Commands::Incidents(args) => app.incidents(&args).await?,
        Commands::Analytics {
            bbox,
            local,
            period,
        } => app.analytics(bbox, local, &period).await?,
        Commands::Flow { bbox, max_points } => app.flow(bbox, max_points).await?,
        Commands::Risk { lat, lon, radius } => app.risk(lat, lon, radius).await?,
        Commands::Watch(args) => {
            let criteria = args.criteria();
            let scheduler = match args.bbox {
                Some(bbox) => QueryScheduler::new(
                    Arc::clone(&app.api),
                    SchedulerConfig {
                        default_bbox: bbox,
                        ..app.scheduler.config().clone()
                    },
                ),
                None => app.scheduler.clone(),
            };
            watch::run(scheduler, app.canonicalizer, criteria, args.sort).await?;
        }
        Commands::Health => app.health().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_bbox_and_filters() {
        let cli = Cli::try_parse_from([
            "crashlens",
            "incidents",
            "--bbox",
            "-86.9,36.0,-86.6,36.3",
            "--criticality",
            "major",
            "--length",
            "long",
            "--sort",
            "time",
        ])
        .unwrap();
        let Commands::Incidents(args) = cli.command else {
            panic!("expected incidents command");
        };
        assert_eq!(
            args.bbox,
            Some(BoundingBox::try_new(-86.9, 36.0, -86.6, 36.3).unwrap())
        );
        assert_eq!(args.criticality, Some(Criticality::Major));
        assert_eq!(args.sort, SortKey::Time);
        assert_eq!(args.criteria().length, LengthBucket::Long);
        assert!(args.criteria().search.is_empty());
    }

    #[test]
    fn rejects_degenerate_bbox() {
        let result = Cli::try_parse_from(["crashlens", "flow", "--bbox", "-86.6,36.0,-86.9,36.3"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "crashlens",
            "risk",
            "--lat",
            "36.16",
            "--lon",
            "-86.78",
            "--api-url",
            "http://example.test",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://example.test"));
        assert!(matches!(cli.command, Commands::Risk { radius: None, .. }));
    }

    #[test]
    fn scheduler_config_follows_sync_section() {
        let config = DashboardConfig::from_toml(
            "[sync]\nincident_ttl_secs = 15\nmax_entries = 8\n",
        )
        .unwrap();
        let scheduler = scheduler_config(&config).unwrap();
        assert_eq!(scheduler.incident_ttl, std::time::Duration::from_secs(15));
        assert_eq!(scheduler.flow_ttl, std::time::Duration::from_secs(30));
        assert_eq!(scheduler.max_entries, 8);
        assert_eq!(
            scheduler.default_bbox,
            config.map.default_bbox().unwrap()
        );
    }
}
