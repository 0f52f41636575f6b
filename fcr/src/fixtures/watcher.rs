//! Watches stored before the restart keep their definitions.
//!
//! After the restart the watcher indices may need the migration API, then
//! watcher is started, the stored watches are checked for normalized time
//! values, and watcher is stopped again on every exit path.

use fcr_common::assertions::{expect_at_least, expect_eq, expect_every, expect_present, expect_true};
use fcr_common::document::{as_i64, as_object, as_str, eval};
use fcr_common::{HarnessError, HarnessResult, ServerDocument};
use serde_json::Value;
use tracing::{info, warn};

use super::{Fixture, FixtureContext};
use crate::cluster::{Cluster, hits_total};
use crate::resources;

const WATCHER_INDICES: &str = ".watches,bwc_watch_index,.watcher-history*";
const HISTORY_INDICES: &str = ".watcher-history*";
const PAYLOAD_INDEX: &str = "bwc_watch_index";
const PAYLOAD_TYPE: &str = "bwc_watch_type";
const SYSTEM_INDICES: [&str; 2] = [".watches", ".triggered_watches"];

/// Every seeded timeout is 100s.
const TIMEOUT_MILLIS: i64 = 100_000;

const SEEDED_WATCHES: [(&str, &str); 3] = [
    ("bwc_watch", resources::SIMPLE_WATCH),
    ("bwc_throttle_period", resources::THROTTLE_PERIOD_WATCH),
    ("bwc_funny_timeout", resources::FUNNY_TIMEOUT_WATCH),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    Started,
    Stopped,
}

impl WatcherState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
        }
    }
}

fn watch_path(id: &str) -> String {
    format!("/_xpack/watcher/watch/{id}")
}

/// Poll until every node reports `state`.
fn await_watcher_state(cluster: &Cluster<'_>, state: WatcherState) -> HarnessResult<()> {
    let what = format!("watcher {}", state.as_str());
    cluster.poller().until(&what, || {
        let stats = cluster.client().get("/_xpack/watcher/stats")?;
        let states = stats
            .get_array("stats")?
            .iter()
            .map(|node| as_str("watcher_state", eval("watcher_state", node)?))
            .collect::<Result<Vec<_>, _>>()?;
        expect_every("watcher_state", &states, &state.as_str())
    })
}

fn stop_watcher(cluster: &Cluster<'_>) -> HarnessResult<()> {
    let response = cluster.client().post("/_xpack/watcher/_stop")?;
    expect_eq("watcher stop acknowledged", response.get_bool("acknowledged")?, true)?;
    await_watcher_state(cluster, WatcherState::Stopped)
}

/// A running watcher that is stopped when the session ends.
///
/// [`WatcherSession::scoped`] reports release failures; dropping an
/// unreleased session (for example while unwinding) still stops watcher but
/// can only log the outcome.
#[must_use = "a started watcher must be stopped"]
pub struct WatcherSession<'a> {
    cluster: Cluster<'a>,
    released: bool,
}

impl<'a> WatcherSession<'a> {
    pub fn start(cluster: Cluster<'a>) -> HarnessResult<Self> {
        let response = cluster.client().post("/_xpack/watcher/_start")?;
        expect_eq("watcher start acknowledged", response.get_bool("acknowledged")?, true)?;
        let session = Self {
            cluster,
            released: false,
        };
        match await_watcher_state(&cluster, WatcherState::Started) {
            Ok(()) => {
                info!("watcher started");
                Ok(session)
            }
            Err(err) => Err(session.stop_after(err)),
        }
    }

    pub fn stop(mut self) -> HarnessResult<()> {
        self.released = true;
        stop_watcher(&self.cluster)?;
        info!("watcher stopped");
        Ok(())
    }

    /// Stop, keeping `primary` as the reported failure.
    fn stop_after(self, primary: HarnessError) -> HarnessError {
        match self.stop() {
            Ok(()) => primary,
            Err(cleanup) => HarnessError::Cleanup {
                primary: Box::new(primary),
                cleanup: Box::new(cleanup),
            },
        }
    }

    /// Run `body` with watcher started, stopping it afterwards whatever the outcome.
    pub fn scoped<T>(cluster: Cluster<'a>, body: impl FnOnce() -> HarnessResult<T>) -> HarnessResult<T> {
        let session = Self::start(cluster)?;
        match body() {
            Ok(value) => session.stop().map(|()| value),
            Err(err) => Err(session.stop_after(err)),
        }
    }
}

impl Drop for WatcherSession<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        warn!("watcher session dropped while running, stopping watcher");
        if let Err(err) = stop_watcher(&self.cluster) {
            warn!(error = %err, "failed to stop watcher");
        }
    }
}

/// Run the migration API on the watcher indices when the assistant asks for it.
fn upgrade_watcher_indices(cx: &FixtureContext<'_>) -> HarnessResult<()> {
    info!("checking if the upgrade procedure on the new cluster is required");
    let response = cx.client.get("/_xpack/migration/assistance")?;
    info!(response = %response.root(), "migration assistance");
    let indices = response.get_object("indices")?;
    if !SYSTEM_INDICES.iter().any(|index| indices.contains_key(*index)) {
        info!("upgrade procedure is not required for watcher");
        return Ok(());
    }

    for index in SYSTEM_INDICES {
        let entry = expect_present(&format!("migration entry for {index}"), indices.get(index))?;
        expect_eq(
            &format!("{index} action_required"),
            entry.get("action_required").and_then(Value::as_str),
            Some("upgrade"),
        )?;
    }

    info!("starting upgrade procedure on the new cluster");
    let params = [("error_trace", "true")];
    let watches = cx
        .client
        .post_with("/_xpack/migration/upgrade/.watches", &params)?;
    expect_eq(".watches upgrade timed_out", watches.get_bool("timed_out")?, false)?;
    // three seeded watches, monitoring may have added more
    expect_at_least(".watches upgraded documents", watches.get_i64("total")?, 3)?;

    let triggered = cx
        .client
        .post_with("/_xpack/migration/upgrade/.triggered_watches", &params)?;
    expect_eq(
        ".triggered_watches upgrade timed_out",
        triggered.get_bool("timed_out")?,
        false,
    )?;

    let after = cx.client.get("/_xpack/migration/assistance")?;
    info!(response = %after.root(), "migration assistance after upgrade");
    let remaining = after.get_object("indices")?;
    for index in SYSTEM_INDICES {
        expect_true(
            &format!("{index} still requires an upgrade"),
            !remaining.contains_key(index),
        )?;
    }
    Ok(())
}

fn assert_old_templates_deleted(cluster: &Cluster<'_>) -> HarnessResult<()> {
    let names = cluster.template_names()?;
    let stale: Vec<&String> = names
        .iter()
        .filter(|name| {
            name.as_str() == "watches"
                || name.as_str() == "triggered_watches"
                || name.starts_with("watch-history")
        })
        .collect();
    expect_true(
        &format!("old watcher templates are still installed: {stale:?}"),
        stale.is_empty(),
    )
}

/// Fetch a stored watch, requiring `found`.
fn fetch_watch(cx: &FixtureContext<'_>, id: &str) -> HarnessResult<ServerDocument> {
    let response = cx.client.get(&watch_path(id))?;
    expect_eq(&format!("{id} found"), response.get_bool("found")?, true)?;
    Ok(ServerDocument::from_value(response.eval("watch")?.clone()))
}

fn assert_watch_contents(cx: &FixtureContext<'_>) -> HarnessResult<()> {
    let bwc = fetch_watch(cx, "bwc_watch")?;
    expect_eq(
        "bwc_watch throttle_period_in_millis",
        bwc.get_i64("throttle_period_in_millis")?,
        1000,
    )?;
    for path in [
        "input.search.timeout_in_millis",
        "actions.index_payload.transform.search.timeout_in_millis",
        "actions.index_payload.index.timeout_in_millis",
    ] {
        expect_eq(&format!("bwc_watch {path}"), bwc.get_i64(path)?, TIMEOUT_MILLIS)?;
    }
    expect_eq(
        "bwc_watch index",
        bwc.get_str("actions.index_payload.index.index")?,
        PAYLOAD_INDEX,
    )?;
    expect_eq(
        "bwc_watch doc_type",
        bwc.get_str("actions.index_payload.index.doc_type")?,
        PAYLOAD_TYPE,
    )?;

    let throttled = fetch_watch(cx, "bwc_throttle_period")?;
    for path in [
        "throttle_period_in_millis",
        "actions.index_payload.throttle_period_in_millis",
    ] {
        expect_eq(
            &format!("bwc_throttle_period {path}"),
            throttled.get_i64(path)?,
            TIMEOUT_MILLIS,
        )?;
    }

    // fractional minutes must load as whole milliseconds
    let funny = fetch_watch(cx, "bwc_funny_timeout")?;
    let attachments = funny.get_object("actions.work.email.attachments")?;
    let attachment = expect_present("test_report.pdf attachment", attachments.get("test_report.pdf"))?;
    let request = eval("http.request", attachment)?;
    let field = |name: &str| eval(name, request);
    expect_eq(
        "read_timeout_millis",
        as_i64("read_timeout_millis", field("read_timeout_millis")?)?,
        TIMEOUT_MILLIS,
    )?;
    expect_eq("scheme", as_str("scheme", field("scheme")?)?, "https")?;
    expect_eq("host", as_str("host", field("host")?)?, "example.com")?;
    expect_eq("path", as_str("path", field("path")?)?, "{{ctx.metadata.report_url}}")?;
    expect_eq("port", as_i64("port", field("port")?)?, 8443)?;
    let basic = as_object("auth.basic", field("auth.basic")?)?;
    expect_eq(
        "auth.basic.username",
        basic.get("username").and_then(Value::as_str),
        Some("Aladdin"),
    )?;
    expect_true("auth.basic.password must stay hidden", !basic.contains_key("password"))?;

    let history = cx.client.get(&format!("/{HISTORY_INDICES}/_search"))?;
    expect_at_least("watcher history hits", hits_total(&history)?, 2)
}

fn assert_basic_watch_interactions(cx: &FixtureContext<'_>) -> HarnessResult<()> {
    let watch = resources::load(resources::LOGGING_WATCH)?;
    let path = watch_path("new_watch");

    let put = cx.client.put_json(&path, watch)?;
    info!(response = %put.root(), "created new_watch");
    expect_eq("new_watch created", put.get_bool("created")?, true)?;
    expect_eq("new_watch _version", put.get_i64("_version")?, 1)?;

    let put = cx.client.put_json(&path, watch)?;
    expect_eq("new_watch created on update", put.get_bool("created")?, false)?;
    expect_eq("new_watch _version on update", put.get_i64("_version")?, 2)?;

    let stored = fetch_watch(cx, "new_watch")?;
    expect_eq(
        "new_watch logging level",
        stored.get_str("actions.awesome.logging.level")?,
        "info",
    )?;
    expect_eq(
        "new_watch logging text",
        stored.get_str("actions.awesome.logging.text")?,
        "test",
    )
}

pub struct Watcher;

impl Fixture for Watcher {
    fn name(&self) -> &'static str {
        "watcher"
    }

    fn description(&self) -> &'static str {
        "stored watches survive, are migrated, and keep normalized time values"
    }

    fn seed(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        for (id, resource) in SEEDED_WATCHES {
            info!(watch = id, resource, "adding watch on old cluster");
            cx.client.put_json(&watch_path(id), resources::load(resource)?)?;
        }

        info!("waiting for watch results index to fill up");
        let cluster = cx.cluster();
        cluster.wait_for_yellow(WATCHER_INDICES)?;
        cluster.wait_for_hits(PAYLOAD_INDEX, 2)?;
        cluster.wait_for_hits(HISTORY_INDICES, 2)?;
        info!("done creating watcher-related indices");
        Ok(())
    }

    fn verify(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        info!(old_version = %cx.phase.old_cluster_version, "verifying watches");
        let cluster = cx.cluster();
        cluster.wait_for_yellow(WATCHER_INDICES)?;
        upgrade_watcher_indices(cx)?;

        WatcherSession::scoped(cluster, || {
            assert_old_templates_deleted(&cluster)?;
            assert_watch_contents(cx)?;
            assert_basic_watch_interactions(cx)
        })
    }
}
