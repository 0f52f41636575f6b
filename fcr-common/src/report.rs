//! Per-run pass/fail report.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::HarnessError;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureOutcome {
    pub name: String,
    pub status: OutcomeStatus,
    /// Error kind label, e.g. `assertion` or `poll_timeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl FixtureOutcome {
    pub fn passed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: OutcomeStatus::Passed,
            kind: None,
            error: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failed(name: impl Into<String>, error: &HarnessError, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: OutcomeStatus::Failed,
            kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == OutcomeStatus::Passed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub phase: Phase,
    pub old_cluster_version: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcomes: Vec<FixtureOutcome>,
}

impl Report {
    pub fn new(phase: Phase, old_cluster_version: impl Into<String>) -> Self {
        Self {
            phase,
            old_cluster_version: old_cluster_version.into(),
            started_at: Utc::now(),
            duration_ms: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: FixtureOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.duration_ms = elapsed.as_millis() as u64;
    }

    pub fn passed(&self) -> Vec<&FixtureOutcome> {
        self.outcomes.iter().filter(|o| o.is_passed()).collect()
    }

    pub fn failed(&self) -> Vec<&FixtureOutcome> {
        self.outcomes.iter().filter(|o| !o.is_passed()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(FixtureOutcome::is_passed)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Summary listing every failure with its captured detail.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} run against cluster upgraded from {} ({} ms)",
            self.phase, self.old_cluster_version, self.duration_ms
        );
        for outcome in &self.outcomes {
            let mark = if outcome.is_passed() { "PASS" } else { "FAIL" };
            let _ = writeln!(out, "  [{mark}] {} ({} ms)", outcome.name, outcome.duration_ms);
            if let Some(error) = &outcome.error {
                let _ = writeln!(out, "         {error}");
            }
        }
        let _ = write!(
            out,
            "{} passed, {} failed",
            self.passed().len(),
            self.failed().len()
        );
        out
    }
}
