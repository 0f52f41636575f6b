use fcr_common::assertions::expect_contains;
use fcr_common::{HarnessResult, Method};
use tracing::info;

use super::{Fixture, FixtureContext};

const DOC_PATH: &str = "/testsingledoc/doc/1";
const DOC: &str = r#"{"test":"test"}"#;

/// One document indexed before the restart must read back verbatim.
pub struct SingleDoc;

impl Fixture for SingleDoc {
    fn name(&self) -> &'static str {
        "single_doc"
    }

    fn description(&self) -> &'static str {
        "a single indexed document survives the restart"
    }

    fn seed(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        cx.client
            .request(Method::Put, DOC_PATH, &[("refresh", "true")], Some(DOC))?;
        info!(path = DOC_PATH, "indexed single document");
        self.verify(cx)
    }

    fn verify(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        let body = cx.client.request_text(Method::Get, DOC_PATH, &[], None)?;
        expect_contains("single document source", &body, DOC)
    }
}
