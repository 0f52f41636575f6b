//! Named pre/post-upgrade scenarios.
//!
//! A fixture seeds state while the old cluster is running and verifies that
//! state after the restart. Fixtures never learn the phase from the server:
//! the runner picks `seed` or `verify` from the injected [`PhaseContext`].

mod monitoring;
mod native_realm;
mod single_doc;
mod watcher;

pub use monitoring::Monitoring;
pub use native_realm::{NativeRealm, SecurityIndexState, UPGRADE_REQUIRED_MESSAGE};
pub use single_doc::SingleDoc;
pub use watcher::{Watcher, WatcherSession};

use fcr_common::config::{
    DEFAULT_MONITORING_TEMPLATE_IDS, DEFAULT_MONITORING_TEMPLATE_VERSION,
    DEFAULT_READINESS_TEMPLATES, DEFAULT_SECURITY_INDEX_FORMAT,
};
use fcr_common::{HarnessConfig, HarnessResult, PhaseContext, Poller, RestClient};

use crate::cluster::Cluster;

pub trait Fixture {
    /// Stable name used in reports and `--only` filters.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Create state on the old cluster.
    fn seed(&self, cx: &FixtureContext<'_>) -> HarnessResult<()>;

    /// Check that state survived the restart.
    fn verify(&self, cx: &FixtureContext<'_>) -> HarnessResult<()>;
}

/// Values fixtures compare against that vary between upgrade targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSettings {
    pub readiness_templates: Vec<String>,
    pub monitoring_template_ids: Vec<String>,
    pub monitoring_template_version: i64,
    pub security_index_format: i64,
}

impl Default for FixtureSettings {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            readiness_templates: strings(DEFAULT_READINESS_TEMPLATES),
            monitoring_template_ids: strings(DEFAULT_MONITORING_TEMPLATE_IDS),
            monitoring_template_version: DEFAULT_MONITORING_TEMPLATE_VERSION,
            security_index_format: DEFAULT_SECURITY_INDEX_FORMAT,
        }
    }
}

impl FixtureSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            readiness_templates: config.readiness_templates.value.clone(),
            monitoring_template_ids: config.monitoring_template_ids.value.clone(),
            monitoring_template_version: config.monitoring_template_version.value,
            security_index_format: config.security_index_format.value,
        }
    }
}

/// Everything a fixture call may touch. Immutable for the run.
pub struct FixtureContext<'a> {
    pub client: &'a RestClient,
    pub phase: &'a PhaseContext,
    pub poller: Poller,
    pub settings: &'a FixtureSettings,
}

impl<'a> FixtureContext<'a> {
    pub fn new(
        client: &'a RestClient,
        phase: &'a PhaseContext,
        poller: Poller,
        settings: &'a FixtureSettings,
    ) -> Self {
        Self {
            client,
            phase,
            poller,
            settings,
        }
    }

    pub fn cluster(&self) -> Cluster<'a> {
        Cluster::new(self.client, self.poller)
    }
}

/// All fixtures in registration order.
pub fn default_fixtures() -> Vec<Box<dyn Fixture>> {
    vec![
        Box::new(SingleDoc),
        Box::new(NativeRealm),
        Box::new(Monitoring),
        Box::new(Watcher),
    ]
}
