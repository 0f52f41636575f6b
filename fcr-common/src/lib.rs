//! Shared plumbing for the full cluster restart harness.
//!
//! The harness drives a two-phase protocol against a black-box cluster:
//! seed fixtures on the old version, restart into the new version, then
//! verify the fixtures survived. This crate holds everything that is not a
//! fixture: the REST client and its transport seam, response decoding,
//! eventual-assertion polling, the phase gate, configuration and logging.

pub mod assertions;
pub mod client;
pub mod config;
pub mod document;
pub mod errors;
pub mod logging;
pub mod mock;
pub mod phase;
pub mod poll;
pub mod report;

pub use client::{Credentials, HttpRequest, Method, RawResponse, RestClient, Transport, UreqTransport};
pub use config::{ConfigError, HarnessConfig};
pub use document::ServerDocument;
pub use errors::{
    DecodeError, HarnessError, HarnessResult, HttpError, PathError, RetryableError, TransportError,
};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use phase::{ClusterVersion, Phase, PhaseContext};
pub use poll::{PollResult, Poller};
pub use report::{FixtureOutcome, OutcomeStatus, Report};
