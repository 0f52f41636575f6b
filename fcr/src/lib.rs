//! Full cluster restart harness.
//!
//! Seeds fixtures against a cluster before an upgrade and verifies them
//! after the restart. Which of the two runs this is comes from injected
//! configuration; see [`fcr_common::Phase`].

pub mod cli;
pub mod cluster;
pub mod fixtures;
pub mod resources;
pub mod runner;

pub use cluster::Cluster;
pub use fixtures::{Fixture, FixtureContext, FixtureSettings, default_fixtures};
pub use runner::{Preflight, RunnerError, ScenarioRunner};
