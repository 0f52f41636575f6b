//! Command-line surface of the `fcr` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fcr_common::config::Sourced;
use fcr_common::{ConfigError, HarnessConfig, Report, RestClient, Transport};
use tracing::info;

use crate::fixtures::{FixtureContext, FixtureSettings, default_fixtures};
use crate::runner::{Preflight, ScenarioRunner};

/// Exit code when at least one fixture failed.
pub const EXIT_FIXTURE_FAILED: u8 = 1;
/// Exit code when the run could not be set up.
pub const EXIT_SETUP_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "fcr",
    version,
    about = "Seed fixtures before a full cluster restart and verify them after"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "FCR_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Seed every fixture (old cluster) or verify it (new cluster)
    Run(RunArgs),

    /// List registered fixtures in run order
    List,

    /// Print the effective configuration and where each value came from
    ShowConfig(OverrideArgs),
}

/// Flags that override file and environment configuration.
#[derive(Args, Debug, Default, Clone)]
pub struct OverrideArgs {
    /// Cluster base URL
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// This run targets the cluster before the upgrade
    #[arg(long, conflicts_with = "new_cluster")]
    pub old_cluster: bool,

    /// This run targets the cluster after the upgrade
    #[arg(long)]
    pub new_cluster: bool,

    /// Version the cluster ran before the upgrade
    #[arg(long, value_name = "VERSION")]
    pub old_cluster_version: Option<String>,

    /// User for basic authentication
    #[arg(long)]
    pub username: Option<String>,

    /// Bound for each eventual assertion, e.g. 30s
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub poll_timeout: Option<Duration>,

    /// Pause between eventual assertion attempts, e.g. 500ms
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub poll_interval: Option<Duration>,
}

impl OverrideArgs {
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Sourced::from_cli(endpoint.clone(), "--endpoint");
        }
        if self.old_cluster {
            config.is_old_cluster = Some(Sourced::from_cli(true, "--old-cluster"));
        } else if self.new_cluster {
            config.is_old_cluster = Some(Sourced::from_cli(false, "--new-cluster"));
        }
        if let Some(version) = &self.old_cluster_version {
            config.old_cluster_version = Some(Sourced::from_cli(version.clone(), "--old-cluster-version"));
        }
        if let Some(username) = &self.username {
            config.username = Sourced::from_cli(username.clone(), "--username");
        }
        if let Some(timeout) = self.poll_timeout {
            config.poll_timeout = Sourced::from_cli(timeout, "--poll-timeout");
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = Sourced::from_cli(interval, "--poll-interval");
        }
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Run only the named fixture (repeatable)
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// Do not wait for startup templates before running fixtures
    #[arg(long)]
    pub skip_preflight: bool,

    /// Also write the report as JSON
    #[arg(long, value_name = "PATH")]
    pub report_json: Option<PathBuf>,
}

/// Defaults, file, environment, then flags; validated.
pub fn resolve_config(file: Option<&Path>, overrides: &OverrideArgs) -> Result<HarnessConfig, ConfigError> {
    let mut config = HarnessConfig::load(file)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Run one phase against `transport` and return the report.
pub fn run_phase(config: &HarnessConfig, transport: impl Transport + 'static, args: &RunArgs) -> Result<Report> {
    let phase = config.phase_context()?;
    let settings = FixtureSettings::from_config(config);
    let client = RestClient::new(transport, phase.credentials.clone());
    let cx = FixtureContext::new(&client, &phase, config.poller(), &settings);

    let mut runner = ScenarioRunner::new(default_fixtures());
    if !args.only.is_empty() {
        runner = runner.only(&args.only)?;
    }
    if !args.skip_preflight {
        runner = runner.with_preflight(Preflight::new(settings.readiness_templates.clone()));
    }

    let report = runner.run(&cx);
    if let Some(path) = &args.report_json {
        let json = report.to_json_pretty().context("failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON report");
    }
    Ok(report)
}

/// `name  description` rows for `fcr list`.
pub fn fixture_listing() -> Vec<String> {
    default_fixtures()
        .iter()
        .map(|f| format!("{:<14}{}", f.name(), f.description()))
        .collect()
}

pub fn render_config(config: &HarnessConfig) -> String {
    config
        .describe()
        .into_iter()
        .map(|(key, value, origin)| {
            if origin.is_empty() {
                format!("{key:<32}{value}")
            } else {
                format!("{key:<32}{value}  ({origin})")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
