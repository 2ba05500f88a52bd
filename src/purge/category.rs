use std::fmt;

use chrono::{DateTime, Utc};

use crate::{
    db::{ReplicationTables, TableRef},
    parameters,
};

/// A group of rows sharing one retention window and one deletion predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Captured change rows whose routing has been fully purged.
    Data,
    /// Routing rows linking captured data to outgoing batches.
    DataEvent,
    /// Batches sent to remote nodes.
    OutgoingBatch,
    /// Captured rows that never got routed because their channel is unknown.
    StrandedData,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Data => "data",
            Category::DataEvent => "data_event",
            Category::OutgoingBatch => "outgoing_batch",
            Category::StrandedData => "stranded_data",
        }
    }

    /// Parameter holding the retention window in minutes.
    pub fn retention_parameter(&self) -> &'static str {
        match self {
            Category::Data => parameters::PURGE_RETENTION_DATA_MINUTES,
            Category::DataEvent => parameters::PURGE_RETENTION_DATA_EVENT_MINUTES,
            Category::OutgoingBatch => parameters::PURGE_RETENTION_OUTGOING_MINUTES,
            Category::StrandedData => parameters::PURGE_RETENTION_STRANDED_MINUTES,
        }
    }

    /// Retention window used when the parameter is not set.
    pub fn default_retention_minutes(&self) -> i64 {
        match self {
            // 5 days
            Category::Data | Category::DataEvent | Category::OutgoingBatch => 7_200,
            // 10 days
            Category::StrandedData => 14_400,
        }
    }

    /// The table rows of this category are deleted from.
    pub fn table(&self, tables: &ReplicationTables) -> TableRef {
        match self {
            Category::Data | Category::StrandedData => tables.data(),
            Category::DataEvent => tables.data_event(),
            Category::OutgoingBatch => tables.outgoing_batch(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes stored in `outgoing_batch.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchStatus {
    New,
    Routing,
    Querying,
    Sending,
    Loading,
    Error,
    Request,
    Ignored,
    Ok,
}

impl BatchStatus {
    /// Statuses after which the batch no longer protects the rows it references.
    pub const TERMINAL: [BatchStatus; 2] = [BatchStatus::Ok, BatchStatus::Ignored];

    pub fn code(&self) -> &'static str {
        match self {
            BatchStatus::New => "NE",
            BatchStatus::Routing => "RT",
            BatchStatus::Querying => "QY",
            BatchStatus::Sending => "SE",
            BatchStatus::Loading => "LD",
            BatchStatus::Error => "ER",
            BatchStatus::Request => "RQ",
            BatchStatus::Ignored => "IG",
            BatchStatus::Ok => "OK",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// `'OK', 'IG'` for use in an SQL `IN` list.
    pub(crate) fn terminal_sql_list() -> String {
        Self::TERMINAL
            .iter()
            .map(|status| format!("'{}'", status.code()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The point in time before which rows of a category may be purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCutoff {
    pub category: Category,
    pub cutoff: DateTime<Utc>,
}

/// Inclusive id range of purge candidates. Never inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeRange {
    min_id: i64,
    max_id: i64,
}

impl PurgeRange {
    /// Returns `None` when `min_id > max_id`.
    pub fn new(min_id: i64, max_id: i64) -> Option<Self> {
        (min_id <= max_id).then_some(Self { min_id, max_id })
    }

    pub fn min_id(&self) -> i64 {
        self.min_id
    }

    pub fn max_id(&self) -> i64 {
        self.max_id
    }

    /// Number of ids spanned by the range, saturating at `u64::MAX`.
    pub fn span(&self) -> u64 {
        (self.max_id as i128 - self.min_id as i128 + 1)
            .try_into()
            .unwrap_or(u64::MAX)
    }

    /// Consecutive `[lo, hi]` slices of at most `size` ids covering the
    /// range, in ascending order.
    pub fn slices(&self, size: u64) -> Slices {
        Slices {
            next: Some(self.min_id),
            max_id: self.max_id,
            size: size.max(1),
        }
    }
}

/// Iterator returned by [`PurgeRange::slices`].
#[derive(Debug, Clone)]
pub struct Slices {
    next: Option<i64>,
    max_id: i64,
    size: u64,
}

impl Iterator for Slices {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        let lo = self.next?;
        let step = i64::try_from(self.size - 1).unwrap_or(i64::MAX);
        let hi = lo.saturating_add(step).min(self.max_id);
        self.next = if hi < self.max_id { Some(hi + 1) } else { None };
        Some((lo, hi))
    }
}
