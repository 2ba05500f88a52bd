use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{
    dialect::{Dialect, Statement},
    error::DbResult,
};

/// Executes purge statements against one database.
///
/// Implementations own their connection pool and the [`Dialect`] matching
/// it. They run statements exactly as given; eligibility, chunking and
/// retries are decided by the callers in [`crate::purge`].
#[async_trait]
pub trait PurgeRepo: Send + Sync {
    /// The dialect statements for this repository must be built with.
    fn dialect(&self) -> &dyn Dialect;

    /// Current time according to the database server.
    async fn server_time(&self) -> DbResult<DateTime<Utc>>;

    /// Runs a `min_id`/`max_id` query. Returns `None` when no row matched.
    async fn fetch_min_max(&self, statement: &Statement) -> DbResult<Option<(i64, i64)>>;

    /// Runs a query whose single `id` column lists row ids.
    async fn fetch_ids(&self, statement: &Statement) -> DbResult<Vec<i64>>;

    /// Executes a statement in its own transaction and returns the number of
    /// rows affected. The transaction is committed only if the statement
    /// succeeds; any error rolls it back.
    async fn execute_in_transaction(&self, statement: &Statement) -> DbResult<u64>;
}

/// Turns the nullable aggregate pair of a min/max query into a range.
pub(crate) fn min_max_pair(min_id: Option<i64>, max_id: Option<i64>) -> DbResult<Option<(i64, i64)>> {
    match (min_id, max_id) {
        (Some(min_id), Some(max_id)) if min_id <= max_id => Ok(Some((min_id, max_id))),
        (None, None) => Ok(None),
        (min_id, max_id) => Err(crate::db::DbError::Internal(format!(
            "inconsistent id range: min={min_id:?} max={max_id:?}"
        ))),
    }
}
