//! Purging of replication history.
//!
//! A purge run resolves a cutoff per [`Category`], scans the id range of the
//! rows eligible under that cutoff with a single min/max query, and deletes
//! the range in bounded batches that each commit on their own.
//!
//! [`PurgeService`] exposes the runs:
//!
//! | Operation                 | Categories, in order              | Cutoff              |
//! |---------------------------|-----------------------------------|---------------------|
//! | `purge_incoming`          | `data_event`, `data`              | retention windows   |
//! | `purge_outgoing`          | `outgoing_batch`, `stranded_data` | retention windows   |
//! | `purge_incoming_before`   | `data_event`, `data`              | caller-supplied     |
//! | `purge_outgoing_before`   | `outgoing_batch`, `stranded_data` | caller-supplied     |

mod category;
pub mod deleter;
mod error;
mod policy;
pub mod range;
mod service;

pub use category::{BatchStatus, Category, PurgeRange, RetentionCutoff, Slices};
pub use error::PurgeError;
pub use policy::{BatchLimits, RetentionPolicy};
pub use service::{
    CategoryOutcome, CategoryStatus, PurgeOperation, PurgeReport, PurgeService, validate_cutoff,
};
