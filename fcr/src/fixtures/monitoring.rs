use fcr_common::assertions::{expect_at_least, expect_eq};
use fcr_common::document::{as_i64, eval};
use fcr_common::HarnessResult;
use tracing::info;

use super::{Fixture, FixtureContext};
use crate::cluster::hits_total;

const MONITORING_ES_INDICES: &str = ".monitoring-es-*";

/// Monitoring keeps collecting across the restart, with refreshed templates.
pub struct Monitoring;

impl Monitoring {
    fn run(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        let cluster = cx.cluster();
        cluster.wait_for_yellow(MONITORING_ES_INDICES)?;

        if !cx.phase.is_pre_upgrade() {
            wait_for_monitoring_templates(cx)?;
        }

        let expected_version = cluster.cluster_version()?;
        wait_for_cluster_stats(cx, &expected_version)
    }
}

fn wait_for_monitoring_templates(cx: &FixtureContext<'_>) -> HarnessResult<()> {
    let ids = &cx.settings.monitoring_template_ids;
    let expected = cx.settings.monitoring_template_version;
    cx.poller.until("monitoring templates", || {
        let templates = cx.client.get("/_template/.monitoring-*")?;
        // older versions published legacy templates next to the current ones
        expect_at_least(
            "monitoring template count",
            templates.keys().len() as i64,
            ids.len() as i64,
        )?;
        for id in ids {
            let name = format!(".monitoring-{id}");
            let template = templates.get_key(&name)?;
            let version = as_i64("version", eval("version", template)?)?;
            expect_eq(&format!("{name} version"), version, expected)?;
        }
        Ok(())
    })
}

fn wait_for_cluster_stats(cx: &FixtureContext<'_>, expected_version: &str) -> HarnessResult<()> {
    cx.poller.until("cluster_stats document", || {
        let response = cx.client.get_with(
            &format!("/{MONITORING_ES_INDICES}/_search"),
            &[
                ("q", "type:cluster_stats _type:cluster_stats"),
                ("size", "1"),
                ("sort", "timestamp:desc"),
            ],
        )?;
        expect_at_least("No cluster_stats documents found.", hits_total(&response)?, 1)?;
        expect_eq(
            "cluster_stats version",
            response.get_str("hits.hits.0._source.version")?,
            expected_version,
        )
    })?;
    info!(version = expected_version, "cluster_stats collected for current version");
    Ok(())
}

impl Fixture for Monitoring {
    fn name(&self) -> &'static str {
        "monitoring"
    }

    fn description(&self) -> &'static str {
        "monitoring restarts, refreshes its templates and reports the current version"
    }

    fn seed(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        self.run(cx)
    }

    fn verify(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        self.run(cx)
    }
}
