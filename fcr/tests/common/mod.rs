#![allow(dead_code)]

pub mod fake_cluster;

use std::time::Duration;

use fcr::cli::{RunArgs, run_phase};
use fcr_common::config::Sourced;
use fcr_common::logging::init_test_logging;
use fcr_common::{HarnessConfig, Report};

pub use fake_cluster::FakeCluster;

pub const OLD_VERSION: &str = "5.6.0";
pub const NEW_VERSION: &str = "6.0.0";

/// Config for one phase with polling tightened for the in-memory cluster.
pub fn config(is_old_cluster: bool) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.is_old_cluster = Some(Sourced::from_cli(is_old_cluster, "--test"));
    config.old_cluster_version = Some(Sourced::from_cli(OLD_VERSION.to_string(), "--test"));
    config.poll_timeout = Sourced::from_cli(Duration::from_secs(2), "--test");
    config.poll_interval = Sourced::from_cli(Duration::from_millis(5), "--test");
    config
}

pub fn run(cluster: &FakeCluster, is_old_cluster: bool, args: &RunArgs) -> Report {
    init_test_logging();
    run_phase(&config(is_old_cluster), cluster.clone(), args).expect("run should be set up")
}

/// Fresh cluster with the pre-upgrade phase already seeded.
pub fn seeded_cluster() -> FakeCluster {
    let cluster = FakeCluster::new(OLD_VERSION);
    let report = run(&cluster, true, &RunArgs::default());
    assert!(report.is_success(), "seeding failed:\n{}", report.render_text());
    cluster
}

pub fn only(names: &[&str]) -> RunArgs {
    RunArgs {
        only: names.iter().map(|n| n.to_string()).collect(),
        ..Default::default()
    }
}
