//! Named engine parameters.
//!
//! The replication engine owns a process-wide parameter store; the purge
//! engine only reads it through [`ParameterService`]. Lookups take the
//! default to use when the parameter is absent, mirroring how the engine's
//! other services consume parameters.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ParametersConfig;

// Retention windows, in minutes. Zero or negative disables the category.
pub const PURGE_RETENTION_DATA_MINUTES: &str = "purge.retention.data.minutes";
pub const PURGE_RETENTION_DATA_EVENT_MINUTES: &str = "purge.retention.data.event.minutes";
pub const PURGE_RETENTION_OUTGOING_MINUTES: &str = "purge.retention.outgoing.minutes";
pub const PURGE_RETENTION_STRANDED_MINUTES: &str = "purge.retention.stranded.minutes";

// Batching and retry tuning.
pub const PURGE_MAX_ROWS_PER_BATCH: &str = "purge.maxRowsPerBatch";
pub const PURGE_DELETE_MAX_ATTEMPTS: &str = "purge.delete.max.attempts";
pub const PURGE_DELETE_RETRY_BACKOFF_MS: &str = "purge.delete.retry.backoff.ms";

// Switches.
pub const PURGE_STRANDED_ENABLED: &str = "purge.stranded.enabled";
pub const PURGE_DRY_RUN: &str = "purge.dry.run";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter '{name}' has malformed value '{value}': expected {expected}")]
    Malformed {
        name: String,
        value: String,
        expected: &'static str,
    },
}

/// Read access to the engine's named parameters.
pub trait ParameterService: Send + Sync {
    /// Returns the integer value of `name`, or `default` when it is not set.
    fn get_long(&self, name: &str, default: i64) -> Result<i64, ParameterError>;

    /// Returns the boolean value of `name`, or `default` when it is not set.
    fn get_boolean(&self, name: &str, default: bool) -> Result<bool, ParameterError>;
}

/// Parameter service backed by the `[parameters]` section of the configuration.
///
/// Values may be native TOML integers and booleans, or strings (typically the
/// result of `${VAR}` expansion) which are parsed on lookup.
#[derive(Debug, Clone, Default)]
pub struct ConfigParameterService {
    values: Arc<ParametersConfig>,
}

impl ConfigParameterService {
    pub fn new(values: ParametersConfig) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    fn malformed(name: &str, value: &toml::Value, expected: &'static str) -> ParameterError {
        let value = match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ParameterError::Malformed {
            name: name.to_string(),
            value,
            expected,
        }
    }
}

impl ParameterService for ConfigParameterService {
    fn get_long(&self, name: &str, default: i64) -> Result<i64, ParameterError> {
        match self.values.get(name) {
            None => Ok(default),
            Some(toml::Value::Integer(value)) => Ok(*value),
            Some(value @ toml::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Self::malformed(name, value, "an integer")),
            Some(value) => Err(Self::malformed(name, value, "an integer")),
        }
    }

    fn get_boolean(&self, name: &str, default: bool) -> Result<bool, ParameterError> {
        match self.values.get(name) {
            None => Ok(default),
            Some(toml::Value::Boolean(value)) => Ok(*value),
            Some(value @ toml::Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(Self::malformed(name, value, "a boolean")),
            },
            Some(value) => Err(Self::malformed(name, value, "a boolean")),
        }
    }
}
