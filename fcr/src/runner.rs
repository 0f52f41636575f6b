//! Sequences fixtures for one phase and collects their outcomes.

use std::time::Instant;

use fcr_common::assertions::expect_true;
use fcr_common::{FixtureOutcome, HarnessResult, Phase, Report};
use thiserror::Error;
use tracing::{error, info, info_span};

use crate::fixtures::{Fixture, FixtureContext};

/// Report entry name for the readiness check.
pub const PREFLIGHT_NAME: &str = "preflight";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("unknown fixture '{name}' (known: {known})")]
    UnknownFixture { name: String, known: String },
}

/// Waits for the templates the cluster installs on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    templates: Vec<String>,
}

impl Preflight {
    pub fn new(templates: Vec<String>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn check(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        let cluster = cx.cluster();
        for template in &self.templates {
            cx.poller.until(&format!("template {template}"), || {
                expect_true(
                    &format!("template {template} is not installed yet"),
                    cluster.template_exists(template)?,
                )
            })?;
        }
        Ok(())
    }
}

pub struct ScenarioRunner {
    fixtures: Vec<Box<dyn Fixture>>,
    preflight: Option<Preflight>,
}

impl ScenarioRunner {
    pub fn new(fixtures: Vec<Box<dyn Fixture>>) -> Self {
        Self {
            fixtures,
            preflight: None,
        }
    }

    pub fn with_preflight(mut self, preflight: Preflight) -> Self {
        self.preflight = Some(preflight);
        self
    }

    /// Keep only the named fixtures, still in registration order.
    pub fn only<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self, RunnerError> {
        if let Some(unknown) = names
            .iter()
            .map(|name| name.as_ref())
            .find(|name| !self.fixtures.iter().any(|f| f.name() == *name))
        {
            return Err(RunnerError::UnknownFixture {
                name: unknown.to_string(),
                known: self.fixture_names().join(", "),
            });
        }
        self.fixtures
            .retain(|f| names.iter().any(|name| name.as_ref() == f.name()));
        Ok(self)
    }

    pub fn fixture_names(&self) -> Vec<&'static str> {
        self.fixtures.iter().map(|f| f.name()).collect()
    }

    /// Run every fixture once for the context's phase.
    ///
    /// A failing fixture is recorded and the next one still runs.
    pub fn run(&self, cx: &FixtureContext<'_>) -> Report {
        let phase = cx.phase.phase;
        let started = Instant::now();
        let mut report = Report::new(phase, cx.phase.old_cluster_version.to_string());
        info!(%phase, old_version = %cx.phase.old_cluster_version, fixtures = self.fixtures.len(), "starting run");

        if let Some(preflight) = &self.preflight {
            report.record(timed(PREFLIGHT_NAME, || preflight.check(cx)));
        }

        for fixture in &self.fixtures {
            let span = info_span!("fixture", name = fixture.name(), %phase);
            let _enter = span.enter();
            let outcome = timed(fixture.name(), || match phase {
                Phase::PreUpgrade => fixture.seed(cx),
                Phase::PostUpgrade => fixture.verify(cx),
            });
            report.record(outcome);
        }

        report.finish(started.elapsed());
        info!(
            passed = report.passed().len(),
            failed = report.failed().len(),
            duration_ms = report.duration_ms,
            "run finished"
        );
        report
    }
}

fn timed(name: &str, step: impl FnOnce() -> HarnessResult<()>) -> FixtureOutcome {
    let started = Instant::now();
    match step() {
        Ok(()) => {
            info!(fixture = name, "passed");
            FixtureOutcome::passed(name, started.elapsed())
        }
        Err(err) => {
            error!(fixture = name, kind = err.kind(), error = %err, "failed");
            FixtureOutcome::failed(name, &err, started.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use fcr_common::mock::MockTransport;
    use fcr_common::{ClusterVersion, Credentials, HarnessError, Method, PhaseContext, Poller, RestClient};

    use super::*;
    use crate::fixtures::FixtureSettings;

    /// Records which step ran; fails when told to.
    struct Probe {
        name: &'static str,
        fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        fn boxed(name: &'static str, fail: bool, calls: &Arc<Mutex<Vec<String>>>) -> Box<dyn Fixture> {
            Box::new(Self {
                name,
                fail,
                calls: calls.clone(),
            })
        }

        fn step(&self, step: &str) -> HarnessResult<()> {
            self.calls.lock().unwrap().push(format!("{}:{step}", self.name));
            if self.fail {
                Err(HarnessError::assertion(format!("{} broke", self.name)))
            } else {
                Ok(())
            }
        }
    }

    impl Fixture for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "probe"
        }

        fn seed(&self, _cx: &FixtureContext<'_>) -> HarnessResult<()> {
            self.step("seed")
        }

        fn verify(&self, _cx: &FixtureContext<'_>) -> HarnessResult<()> {
            self.step("verify")
        }
    }

    struct Harness {
        client: RestClient,
        phase: PhaseContext,
        settings: FixtureSettings,
    }

    impl Harness {
        fn new(phase: Phase, mock: Arc<MockTransport>) -> Self {
            let credentials = Credentials::new("test_user", "x-pack-test-password");
            Self {
                client: RestClient::new(mock, credentials.clone()),
                phase: PhaseContext::new(phase, "5.6.0".parse::<ClusterVersion>().unwrap(), credentials),
                settings: FixtureSettings::default(),
            }
        }

        fn cx(&self) -> FixtureContext<'_> {
            FixtureContext::new(
                &self.client,
                &self.phase,
                Poller::new(Duration::from_millis(100), Duration::from_millis(10)),
                &self.settings,
            )
        }
    }

    fn probes(calls: &Arc<Mutex<Vec<String>>>) -> Vec<Box<dyn Fixture>> {
        vec![
            Probe::boxed("first", false, calls),
            Probe::boxed("second", true, calls),
            Probe::boxed("third", false, calls),
        ]
    }

    #[test]
    fn test_pre_upgrade_seeds_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let harness = Harness::new(Phase::PreUpgrade, Arc::new(MockTransport::new()));
        let report = ScenarioRunner::new(probes(&calls)).run(&harness.cx());

        assert_eq!(*calls.lock().unwrap(), vec!["first:seed", "second:seed", "third:seed"]);
        assert_eq!(report.phase, Phase::PreUpgrade);
        assert_eq!(report.old_cluster_version, "5.6.0");
    }

    #[test]
    fn test_failure_does_not_stop_later_fixtures() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let harness = Harness::new(Phase::PostUpgrade, Arc::new(MockTransport::new()));
        let report = ScenarioRunner::new(probes(&calls)).run(&harness.cx());

        assert_eq!(calls.lock().unwrap().len(), 3);
        assert!(calls.lock().unwrap().iter().all(|c| c.ends_with(":verify")));
        assert!(!report.is_success());
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "second");
        assert_eq!(failed[0].error.as_deref(), Some("assertion failed: second broke"));
    }

    #[test]
    fn test_only_filters_and_keeps_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = ScenarioRunner::new(probes(&calls))
            .only(&["third", "first"])
            .unwrap();
        assert_eq!(runner.fixture_names(), vec!["first", "third"]);
    }

    #[test]
    fn test_only_rejects_unknown_names() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let err = ScenarioRunner::new(probes(&calls)).only(&["fourth"]).err().unwrap();
        assert_eq!(
            err,
            RunnerError::UnknownFixture {
                name: "fourth".to_string(),
                known: "first, second, third".to_string(),
            }
        );
    }

    #[test]
    fn test_preflight_failure_is_recorded_and_fixtures_still_run() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let harness = Harness::new(Phase::PostUpgrade, Arc::new(MockTransport::new()));
        let report = ScenarioRunner::new(probes(&calls))
            .with_preflight(Preflight::new(vec![".ml-state".to_string()]))
            .run(&harness.cx());

        assert_eq!(report.outcomes[0].name, PREFLIGHT_NAME);
        assert_eq!(report.outcomes[0].kind.as_deref(), Some("poll_timeout"));
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_preflight_waits_for_templates() {
        let mock = Arc::new(MockTransport::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        mock.handle(Method::Get, "/_template/.ml-meta", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                fcr_common::RawResponse::new(404, "{}")
            } else {
                fcr_common::RawResponse::new(200, r#"{".ml-meta": {}}"#)
            }
        });
        let harness = Harness::new(Phase::PreUpgrade, mock);
        let report = ScenarioRunner::new(Vec::new())
            .with_preflight(Preflight::new(vec![".ml-meta".to_string()]))
            .run(&harness.cx());

        assert!(report.is_success(), "{}", report.render_text());
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
