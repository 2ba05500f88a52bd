//! Retention policy: turns named parameters into cutoffs and batch limits.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};

use super::{Category, PurgeError, RetentionCutoff};
use crate::parameters::{self, ParameterService};

const DEFAULT_MAX_ROWS_PER_BATCH: i64 = 5_000;
const DEFAULT_DELETE_MAX_ATTEMPTS: i64 = 3;
const DEFAULT_DELETE_RETRY_BACKOFF_MS: i64 = 200;

/// Limits applied to every batch of a purge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum number of ids covered by a single delete statement.
    pub batch_size: u64,
    /// Attempts per batch, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_MAX_ROWS_PER_BATCH as u64,
            max_attempts: DEFAULT_DELETE_MAX_ATTEMPTS as u32,
            backoff: Duration::from_millis(DEFAULT_DELETE_RETRY_BACKOFF_MS as u64),
        }
    }
}

/// Reads purge parameters. Holds no state of its own, so every call sees the
/// current parameter values.
#[derive(Clone)]
pub struct RetentionPolicy {
    params: Arc<dyn ParameterService>,
}

impl RetentionPolicy {
    pub fn new(params: Arc<dyn ParameterService>) -> Self {
        Self { params }
    }

    /// Cutoff for `category` relative to `now`.
    ///
    /// Returns `Ok(None)` when the retention window is zero or negative,
    /// which disables purging of the category.
    pub fn resolve_cutoff(
        &self,
        category: Category,
        now: DateTime<Utc>,
    ) -> Result<Option<RetentionCutoff>, PurgeError> {
        let name = category.retention_parameter();
        let minutes = self
            .params
            .get_long(name, category.default_retention_minutes())?;

        if minutes <= 0 {
            return Ok(None);
        }

        let cutoff = TimeDelta::try_minutes(minutes)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                PurgeError::Configuration(format!(
                    "parameter '{name}' = {minutes} minutes reaches before the earliest representable time"
                ))
            })?;

        Ok(Some(RetentionCutoff { category, cutoff }))
    }

    pub fn batch_limits(&self) -> Result<BatchLimits, PurgeError> {
        let batch_size = self.positive(
            parameters::PURGE_MAX_ROWS_PER_BATCH,
            DEFAULT_MAX_ROWS_PER_BATCH,
        )?;
        let max_attempts = self.positive(
            parameters::PURGE_DELETE_MAX_ATTEMPTS,
            DEFAULT_DELETE_MAX_ATTEMPTS,
        )?;

        let backoff_ms = self.params.get_long(
            parameters::PURGE_DELETE_RETRY_BACKOFF_MS,
            DEFAULT_DELETE_RETRY_BACKOFF_MS,
        )?;
        let backoff_ms = u64::try_from(backoff_ms).map_err(|_| {
            PurgeError::Configuration(format!(
                "parameter '{}' must not be negative, got {backoff_ms}",
                parameters::PURGE_DELETE_RETRY_BACKOFF_MS
            ))
        })?;

        Ok(BatchLimits {
            batch_size: batch_size as u64,
            max_attempts: u32::try_from(max_attempts).unwrap_or(u32::MAX),
            backoff: Duration::from_millis(backoff_ms),
        })
    }

    /// Whether stranded data is cleaned up as part of the outgoing purge.
    pub fn stranded_enabled(&self) -> Result<bool, PurgeError> {
        Ok(self
            .params
            .get_boolean(parameters::PURGE_STRANDED_ENABLED, true)?)
    }

    /// Whether runs only scan and report instead of deleting.
    pub fn dry_run(&self) -> Result<bool, PurgeError> {
        Ok(self.params.get_boolean(parameters::PURGE_DRY_RUN, false)?)
    }

    fn positive(&self, name: &str, default: i64) -> Result<i64, PurgeError> {
        let value = self.params.get_long(name, default)?;
        if value <= 0 {
            return Err(PurgeError::Configuration(format!(
                "parameter '{name}' must be positive, got {value}"
            )));
        }
        Ok(value)
    }
}
