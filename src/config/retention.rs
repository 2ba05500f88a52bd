//! Purge worker scheduling configuration.
//!
//! Configures the background worker that triggers the purge operations on a
//! fixed interval. What is deleted, and how far back, is controlled by the
//! `[parameters]` section instead.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! incoming_interval_secs = 3600
//! outgoing_interval_secs = 600
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Purge worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether the purge worker runs.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run the incoming purge (data events, then data), in seconds.
    /// Default: 3600
    #[serde(default = "default_incoming_interval_secs")]
    pub incoming_interval_secs: u64,

    /// How often to run the outgoing purge (batches, then stranded data), in seconds.
    /// Default: 600
    #[serde(default = "default_outgoing_interval_secs")]
    pub outgoing_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            incoming_interval_secs: default_incoming_interval_secs(),
            outgoing_interval_secs: default_outgoing_interval_secs(),
        }
    }
}

fn default_incoming_interval_secs() -> u64 {
    3600
}

fn default_outgoing_interval_secs() -> u64 {
    600
}

impl RetentionConfig {
    pub fn incoming_interval(&self) -> Duration {
        Duration::from_secs(self.incoming_interval_secs)
    }

    pub fn outgoing_interval(&self) -> Duration {
        Duration::from_secs(self.outgoing_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.incoming_interval_secs == 0 || self.outgoing_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "retention intervals must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
