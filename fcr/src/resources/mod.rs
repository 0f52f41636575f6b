//! Fixture payloads compiled into the binary, keyed by file name.

use fcr_common::{HarnessError, HarnessResult};

/// Watch that indexes a search payload every second.
pub const SIMPLE_WATCH: &str = "simple-watch.json";
/// Watch whose throttle periods are given as time strings.
pub const THROTTLE_PERIOD_WATCH: &str = "throttle-period-watch.json";
/// Watch with a fractional read timeout on an email attachment request.
pub const FUNNY_TIMEOUT_WATCH: &str = "funny-timeout-watch.json";
/// Watch with a single logging action, created after the upgrade.
pub const LOGGING_WATCH: &str = "logging-watch.json";

const BUNDLED: &[(&str, &str)] = &[
    (SIMPLE_WATCH, include_str!("simple-watch.json")),
    (THROTTLE_PERIOD_WATCH, include_str!("throttle-period-watch.json")),
    (FUNNY_TIMEOUT_WATCH, include_str!("funny-timeout-watch.json")),
    (LOGGING_WATCH, include_str!("logging-watch.json")),
];

pub fn load(name: &str) -> HarnessResult<&'static str> {
    BUNDLED
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, body)| *body)
        .ok_or_else(|| HarnessError::Resource(name.to_string()))
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUNDLED.iter().map(|(key, _)| *key)
}
