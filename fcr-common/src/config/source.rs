//! Source tracking for configuration values.

use std::fmt;

use serde::Serialize;

/// Where a configuration value came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
    CommandLine,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::File => write!(f, "config file"),
            Self::Environment => write!(f, "environment"),
            Self::CommandLine => write!(f, "command line"),
        }
    }
}

/// A value together with its origin, e.g. `FCR_POLL_TIMEOUT` or the config file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigValueSource {
    pub source: ConfigSource,
    pub detail: Option<String>,
}

impl fmt::Display for ConfigValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub origin: ConfigValueSource,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            origin: ConfigValueSource {
                source: ConfigSource::Default,
                detail: None,
            },
        }
    }

    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self {
            value,
            origin: ConfigValueSource {
                source: ConfigSource::Environment,
                detail: Some(var.into()),
            },
        }
    }

    pub fn from_file(value: T, path: impl Into<String>) -> Self {
        Self {
            value,
            origin: ConfigValueSource {
                source: ConfigSource::File,
                detail: Some(path.into()),
            },
        }
    }

    pub fn from_cli(value: T, flag: impl Into<String>) -> Self {
        Self {
            value,
            origin: ConfigValueSource {
                source: ConfigSource::CommandLine,
                detail: Some(flag.into()),
            },
        }
    }

    pub fn source(&self) -> ConfigSource {
        self.origin.source
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            origin: self.origin,
        }
    }
}
