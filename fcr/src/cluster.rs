//! Helper calls shared by fixtures.

use fcr_common::assertions::{expect_at_least, expect_eq};
use fcr_common::document::{as_i64, eval};
use fcr_common::{HarnessResult, PathError, Poller, RestClient, ServerDocument};
use tracing::debug;

/// Server-side wait used by health checks.
pub const HEALTH_TIMEOUT: &str = "30s";

/// A client paired with the run's poller.
#[derive(Clone, Copy)]
pub struct Cluster<'a> {
    client: &'a RestClient,
    poller: Poller,
}

impl<'a> Cluster<'a> {
    pub fn new(client: &'a RestClient, poller: Poller) -> Self {
        Self { client, poller }
    }

    pub fn client(&self) -> &'a RestClient {
        self.client
    }

    pub fn poller(&self) -> Poller {
        self.poller
    }

    /// Block server-side until `indices` reach yellow health.
    pub fn wait_for_yellow(&self, indices: &str) -> HarnessResult<()> {
        let health = self.client.get_with(
            &format!("/_cluster/health/{indices}"),
            &[("wait_for_status", "yellow"), ("timeout", HEALTH_TIMEOUT)],
        )?;
        expect_eq(
            &format!("health of {indices} timed_out"),
            health.get_bool("timed_out")?,
            false,
        )
    }

    /// Current `hits.total` of a search against `index`.
    pub fn search_total(&self, index: &str) -> HarnessResult<i64> {
        let response = self.client.get_with(&format!("/{index}/_search"), &[("size", "0")])?;
        Ok(hits_total(&response)?)
    }

    /// Poll until a search on `index` reports at least `expected` hits.
    pub fn wait_for_hits(&self, index: &str, expected: i64) -> HarnessResult<i64> {
        self.poller.until(&format!("hits on {index}"), || {
            let total = self.search_total(index)?;
            expect_at_least(&format!("hits on {index}"), total, expected)?;
            Ok(total)
        })
    }

    /// `version.number` reported by the root endpoint.
    pub fn cluster_version(&self) -> HarnessResult<String> {
        let root = self.client.get("/")?;
        Ok(root.get_str("version.number")?.to_string())
    }

    pub fn template_names(&self) -> HarnessResult<Vec<String>> {
        let templates = self.client.get("/_template")?;
        Ok(templates.keys().into_iter().map(str::to_string).collect())
    }

    /// Whether a template with exactly this name is installed.
    pub fn template_exists(&self, name: &str) -> HarnessResult<bool> {
        match self.client.get(&format!("/_template/{name}")) {
            Ok(doc) => Ok(doc.get_key(name).is_ok()),
            Err(err) if err.as_http().is_some_and(|http| http.status == 404) => {
                debug!(template = name, "template not installed");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

/// `hits.total` as a plain count or as the `{ "value": n }` object newer
/// versions return.
pub fn hits_total(response: &ServerDocument) -> Result<i64, PathError> {
    let total = response.eval("hits.total")?;
    if total.is_object() {
        as_i64("hits.total.value", eval("value", total)?)
    } else {
        as_i64("hits.total", total)
    }
}
