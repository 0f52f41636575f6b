//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `FCR_` environment variables with
//! validation, error collection, and source tracking.

use super::source::Sourced;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error, PartialEq)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Invalid duration format.
    #[error("Invalid duration for {var}: {value}")]
    InvalidDuration { var: String, value: String },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
/// Getters return `None` when the variable is unset so callers can layer
/// environment values over file values without clobbering them.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the FCR_ prefix.
    pub fn new() -> Self {
        Self::with_prefix("FCR_")
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Get the full variable name with prefix.
    pub fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, name: &str) -> Option<(String, String)> {
        let var_name = self.var_name(name);
        env::var(&var_name).ok().map(|value| (var_name, value))
    }

    /// Get a string value (empty counts as unset).
    pub fn get_string(&mut self, name: &str) -> Option<Sourced<String>> {
        match self.raw(name) {
            Some((var, value)) if !value.trim().is_empty() => Some(Sourced::from_env(value, var)),
            _ => None,
        }
    }

    /// Get a boolean value.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off (for false)
    pub fn get_bool(&mut self, name: &str) -> Option<Sourced<bool>> {
        let (var, value) = self.raw(name)?;
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(Sourced::from_env(true, var)),
            "0" | "false" | "no" | "off" => Some(Sourced::from_env(false, var)),
            "" => None,
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a u64 value with range validation.
    pub fn get_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<Sourced<u64>> {
        let (var, value) = self.raw(name)?;
        match value.trim().parse::<u64>() {
            Ok(n) if n >= min && n <= max => Some(Sourced::from_env(n, var)),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "unsigned 64-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a human duration such as `30s`, `500ms` or `1m 30s`.
    pub fn get_duration(&mut self, name: &str) -> Option<Sourced<Duration>> {
        let (var, value) = self.raw(name)?;
        match humantime::parse_duration(value.trim()) {
            Ok(duration) => Some(Sourced::from_env(duration, var)),
            Err(_) => {
                self.errors.push(EnvError::InvalidDuration { var, value });
                None
            }
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str) -> Option<Sourced<String>> {
        let (var, value) = self.raw(name)?;
        let lower = value.trim().to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                Some(Sourced::from_env(lower, var))
            }
            _ => {
                self.errors.push(EnvError::InvalidLogLevel { var, value });
                None
            }
        }
    }

    /// Get a comma-separated list of strings.
    pub fn get_string_list(&mut self, name: &str) -> Option<Sourced<Vec<String>>> {
        let (var, value) = self.raw(name)?;
        let items: Vec<String> = value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Some(Sourced::from_env(items, var))
    }

    /// Get a path (empty counts as unset).
    pub fn get_path(&mut self, name: &str) -> Option<Sourced<PathBuf>> {
        self.get_string(name).map(|s| s.map(PathBuf::from))
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}
