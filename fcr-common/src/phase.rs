//! Phase gate: which half of the two-phase protocol this run executes.
//!
//! The phase is injected (environment, config file, or CLI flag) and fixed
//! for the whole run. It is never inferred from cluster responses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::client::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Running against the old cluster: seed fixtures.
    PreUpgrade,
    /// Running against the restarted, upgraded cluster: verify fixtures.
    PostUpgrade,
}

impl Phase {
    pub fn from_old_cluster_flag(is_old_cluster: bool) -> Self {
        if is_old_cluster {
            Self::PreUpgrade
        } else {
            Self::PostUpgrade
        }
    }

    pub fn is_pre_upgrade(&self) -> bool {
        matches!(self, Self::PreUpgrade)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreUpgrade => write!(f, "pre-upgrade"),
            Self::PostUpgrade => write!(f, "post-upgrade"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cluster version '{0}': expected major.minor.patch[-qualifier]")]
pub struct VersionParseError(pub String);

/// Version of the cluster that existed before the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub qualifier: Option<String>,
}

impl FromStr for ClusterVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionParseError(s.to_string());
        let trimmed = s.trim();
        let (numbers, qualifier) = match trimmed.split_once('-') {
            Some((numbers, qualifier)) if !qualifier.is_empty() => {
                (numbers, Some(qualifier.to_string()))
            }
            Some(_) => return Err(invalid()),
            None => (trimmed, None),
        };

        let parts = numbers
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [major, minor, patch] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: *patch,
                qualifier,
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, "-{qualifier}")?;
        }
        Ok(())
    }
}

/// Immutable per-run context handed to every fixture call.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub phase: Phase,
    pub old_cluster_version: ClusterVersion,
    pub credentials: Credentials,
}

impl PhaseContext {
    pub fn new(phase: Phase, old_cluster_version: ClusterVersion, credentials: Credentials) -> Self {
        Self {
            phase,
            old_cluster_version,
            credentials,
        }
    }

    pub fn is_pre_upgrade(&self) -> bool {
        self.phase.is_pre_upgrade()
    }
}
