use thiserror::Error;

use super::Category;
use crate::{db::DbError, parameters::ParameterError};

#[derive(Debug, Error)]
pub enum PurgeError {
    /// A retention or tuning parameter is malformed or out of range.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied argument was rejected before anything was deleted.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The database dialect cannot express a statement the purge needs.
    #[error("Unsupported operation while purging {category}: {source}")]
    Unsupported {
        category: Category,
        #[source]
        source: DbError,
    },

    /// A batch delete failed for good. `deleted` rows in `batches` batches
    /// were already committed by the same category.
    #[error("Purging {category} failed after {deleted} rows deleted: {source}")]
    Deletion {
        category: Category,
        deleted: u64,
        batches: u32,
        #[source]
        source: DbError,
    },

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl PurgeError {
    /// Rows committed before the error, when the error carries them.
    pub fn deleted(&self) -> u64 {
        match self {
            PurgeError::Deletion { deleted, .. } => *deleted,
            _ => 0,
        }
    }

    /// Batches committed before the error, when the error carries them.
    pub fn batches(&self) -> u32 {
        match self {
            PurgeError::Deletion { batches, .. } => *batches,
            _ => 0,
        }
    }
}

impl From<ParameterError> for PurgeError {
    fn from(err: ParameterError) -> Self {
        PurgeError::Configuration(err.to_string())
    }
}
