use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database not configured")]
    NotConfigured,

    #[error("Unsupported by {dialect} dialect: {operation}")]
    Unsupported {
        dialect: &'static str,
        operation: String,
    },

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DbResult<T> = Result<T, DbError>;

// SQLite primary result codes for lock contention.
#[cfg(feature = "database-sqlite")]
const SQLITE_TRANSIENT_CODES: &[&str] = &["5", "6", "261", "262", "517"];

// PostgreSQL SQLSTATEs: serialization_failure, deadlock_detected,
// lock_not_available, query_canceled (statement_timeout), admin/crash shutdown.
#[cfg(feature = "database-postgres")]
const POSTGRES_TRANSIENT_CODES: &[&str] = &["40001", "40P01", "55P03", "57014", "57P01", "57P02"];

impl DbError {
    /// Whether retrying the same statement may succeed: connection loss,
    /// pool exhaustion, lock contention, deadlocks.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
            DbError::Sqlx(err) => is_transient_sqlx(err),
            _ => false,
        }
    }
}

#[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return false;
            };
            #[cfg(feature = "database-sqlite")]
            if SQLITE_TRANSIENT_CODES.contains(&code.as_ref()) {
                return true;
            }
            #[cfg(feature = "database-postgres")]
            if POSTGRES_TRANSIENT_CODES.contains(&code.as_ref()) {
                return true;
            }
            false
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_is_not_transient() {
        assert!(!DbError::Internal("boom".into()).is_transient());
        assert!(!DbError::NotConfigured.is_transient());
    }

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DbError::Sqlx(sqlx::Error::RowNotFound).is_transient());
    }
}
