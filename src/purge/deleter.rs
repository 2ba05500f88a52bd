//! Batched deletion of a purge range.
//!
//! The range is cut into slices of at most `batch_size` ids, walked in
//! ascending order. Every delete re-applies the eligibility predicate and
//! runs in its own transaction, so a failure leaves earlier batches committed
//! and the next run simply rescans.

use std::future::Future;

use super::{BatchLimits, Category, PurgeError, PurgeRange};
use crate::{
    db::{DbError, DbResult, DialectError, Predicate, PurgeRepo, Statement, TableRef},
    observability::metrics,
};

/// What to delete: a category's table and its eligibility predicate.
#[derive(Debug, Clone)]
pub struct DeleteTarget {
    pub category: Category,
    pub table: TableRef,
    pub predicate: Predicate,
}

/// Totals of a completed [`delete_range`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Rows deleted across all batches.
    pub deleted: u64,
    /// Delete statements committed.
    pub batches: u32,
}

/// Deletes the candidates of `target` within `range`, one bounded batch at a
/// time.
///
/// Uses ranged deletes when the dialect supports them and falls back to
/// selecting the candidate ids of each slice and deleting them by id.
#[tracing::instrument(
    skip_all,
    fields(category = %target.category, min_id = range.min_id(), max_id = range.max_id())
)]
pub async fn delete_range(
    repo: &dyn PurgeRepo,
    target: &DeleteTarget,
    range: PurgeRange,
    limits: &BatchLimits,
) -> Result<DeleteSummary, PurgeError> {
    let mut summary = DeleteSummary::default();
    let mut ranged = true;

    for (lo, hi) in range.slices(limits.batch_size) {
        if ranged {
            match repo
                .dialect()
                .delete_range_statement(&target.table, lo, hi, &target.predicate)
            {
                Ok(statement) => {
                    let deleted = execute_batch(repo, target, &statement, limits, &summary).await?;
                    summary.record(target.category, deleted);
                    continue;
                }
                Err(DialectError::Unsupported { dialect, .. }) => {
                    tracing::debug!(
                        dialect,
                        "Ranged delete unsupported, deleting by id list"
                    );
                    ranged = false;
                }
            }
        }

        delete_slice_by_ids(repo, target, lo, hi, limits, &mut summary).await?;
    }

    Ok(summary)
}

impl DeleteSummary {
    fn record(&mut self, category: Category, deleted: u64) {
        self.deleted += deleted;
        self.batches += 1;
        metrics::record_purge_batch(category.as_str(), deleted);
        tracing::trace!(
            deleted,
            total = self.deleted,
            batch = self.batches,
            "Committed purge batch"
        );
    }
}

/// Fallback for dialects without ranged deletes.
async fn delete_slice_by_ids(
    repo: &dyn PurgeRepo,
    target: &DeleteTarget,
    lo: i64,
    hi: i64,
    limits: &BatchLimits,
    summary: &mut DeleteSummary,
) -> Result<(), PurgeError> {
    let dialect = repo.dialect();
    let select = dialect.select_ids_in_range(&target.table, lo, hi, &target.predicate);
    let ids = with_retry(target.category, limits, || repo.fetch_ids(&select))
        .await
        .map_err(|source| deletion_error(target.category, summary, source))?;

    if ids.is_empty() {
        return Ok(());
    }

    let budget = dialect
        .max_bind_parameters()
        .saturating_sub(target.predicate.binds.len());
    if budget == 0 {
        return Err(PurgeError::Unsupported {
            category: target.category,
            source: DbError::Unsupported {
                dialect: dialect.name(),
                operation: "id-list delete with the eligibility predicate".to_string(),
            },
        });
    }

    for chunk in ids.chunks(budget) {
        let statement = dialect
            .delete_ids_statement(&target.table, chunk, &target.predicate)
            .map_err(|err| PurgeError::Unsupported {
                category: target.category,
                source: err.into(),
            })?;
        let deleted = execute_batch(repo, target, &statement, limits, summary).await?;
        summary.record(target.category, deleted);
    }

    Ok(())
}

async fn execute_batch(
    repo: &dyn PurgeRepo,
    target: &DeleteTarget,
    statement: &Statement,
    limits: &BatchLimits,
    summary: &DeleteSummary,
) -> Result<u64, PurgeError> {
    with_retry(target.category, limits, || {
        repo.execute_in_transaction(statement)
    })
    .await
    .map_err(|source| deletion_error(target.category, summary, source))
}

fn deletion_error(category: Category, summary: &DeleteSummary, source: DbError) -> PurgeError {
    metrics::record_purge_failure(category.as_str());
    match source {
        DbError::Unsupported { .. } => PurgeError::Unsupported { category, source },
        source => PurgeError::Deletion {
            category,
            deleted: summary.deleted,
            batches: summary.batches,
            source,
        },
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or
/// `limits.max_attempts` is reached. Sleeps `backoff * 2^(n-1)` before the
/// n-th retry.
async fn with_retry<T, F, Fut>(category: Category, limits: &BatchLimits, mut op: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < limits.max_attempts => {
                let delay = limits
                    .backoff
                    .saturating_mul(1u32 << (attempt - 1).min(16));
                tracing::warn!(
                    category = %category,
                    attempt,
                    max_attempts = limits.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient database error during purge, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(all(test, any(feature = "database-sqlite", feature = "database-postgres")))]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::db::{BindValue, Dialect, ReplicationTables};

    /// Dialect used by the scripted repo below; range deletes are switchable.
    #[derive(Debug)]
    struct ScriptDialect {
        range_delete: bool,
        max_binds: usize,
    }

    impl Dialect for ScriptDialect {
        fn name(&self) -> &'static str {
            "script"
        }

        fn placeholder(&self, _index: usize) -> String {
            "?".to_string()
        }

        fn max_bind_parameters(&self) -> usize {
            self.max_binds
        }

        fn supports_range_delete(&self) -> bool {
            self.range_delete
        }

        fn current_timestamp_query(&self) -> &'static str {
            "SELECT NOW()"
        }
    }

    /// In-memory repo over the id set `1..=rows` where every id is a
    /// candidate. After `successes` deletes, fails the next `failures`
    /// deletes with `failure`.
    struct ScriptRepo {
        dialect: ScriptDialect,
        remaining: Mutex<Vec<i64>>,
        successes: AtomicU32,
        failures: AtomicU32,
        failure: fn() -> DbError,
        statements: Mutex<Vec<Statement>>,
    }

    impl ScriptRepo {
        fn new(rows: i64, range_delete: bool) -> Self {
            Self {
                dialect: ScriptDialect {
                    range_delete,
                    max_binds: 32,
                },
                remaining: Mutex::new((1..=rows).collect()),
                successes: AtomicU32::new(0),
                failures: AtomicU32::new(0),
                failure: || DbError::Sqlx(sqlx::Error::PoolTimedOut),
                statements: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, successes: u32, failures: u32, failure: fn() -> DbError) -> Self {
            self.successes = AtomicU32::new(successes);
            self.failures = AtomicU32::new(failures);
            self.failure = failure;
            self
        }

        fn remaining(&self) -> usize {
            self.remaining.lock().unwrap().len()
        }

        fn ints(binds: &[BindValue]) -> Vec<i64> {
            binds
                .iter()
                .filter_map(|b| match b {
                    BindValue::Int(v) => Some(*v),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl PurgeRepo for ScriptRepo {
        fn dialect(&self) -> &dyn Dialect {
            &self.dialect
        }

        async fn server_time(&self) -> DbResult<DateTime<Utc>> {
            Ok(Utc::now())
        }

        async fn fetch_min_max(&self, _statement: &Statement) -> DbResult<Option<(i64, i64)>> {
            let remaining = self.remaining.lock().unwrap();
            Ok(remaining.first().zip(remaining.last()).map(|(a, b)| (*a, *b)))
        }

        async fn fetch_ids(&self, statement: &Statement) -> DbResult<Vec<i64>> {
            let bounds = Self::ints(&statement.binds);
            let remaining = self.remaining.lock().unwrap();
            Ok(remaining
                .iter()
                .copied()
                .filter(|id| *id >= bounds[0] && *id <= bounds[1])
                .collect())
        }

        async fn execute_in_transaction(&self, statement: &Statement) -> DbResult<u64> {
            let take = |counter: &AtomicU32| {
                counter
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            };
            if !take(&self.successes) && take(&self.failures) {
                return Err((self.failure)());
            }
            self.statements.lock().unwrap().push(statement.clone());

            let ints = Self::ints(&statement.binds);
            let mut remaining = self.remaining.lock().unwrap();
            let before = remaining.len();
            if statement.sql.contains("BETWEEN") {
                remaining.retain(|id| *id < ints[0] || *id > ints[1]);
            } else {
                remaining.retain(|id| !ints.contains(id));
            }
            Ok((before - remaining.len()) as u64)
        }
    }

    fn target() -> DeleteTarget {
        let tables = ReplicationTables::default();
        DeleteTarget {
            category: Category::Data,
            table: tables.data(),
            predicate: Predicate::new("d.create_time < ?", vec![BindValue::Timestamp(Utc::now())]),
        }
    }

    fn limits(batch_size: u64, max_attempts: u32) -> BatchLimits {
        BatchLimits {
            batch_size,
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_ranged_batches_follow_batch_size() {
        let repo = ScriptRepo::new(10_000, true);
        let range = PurgeRange::new(1, 10_000).unwrap();

        let summary = delete_range(&repo, &target(), range, &limits(1_000, 3))
            .await
            .unwrap();

        assert_eq!(summary, DeleteSummary { deleted: 10_000, batches: 10 });
        let statements = repo.statements.lock().unwrap();
        let lower_bounds: Vec<i64> = statements
            .iter()
            .map(|s| ScriptRepo::ints(&s.binds)[0])
            .collect();
        assert_eq!(lower_bounds, (0..10).map(|i| i * 1_000 + 1).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_falls_back_to_id_lists() {
        let repo = ScriptRepo::new(100, false);
        let range = PurgeRange::new(1, 100).unwrap();

        let summary = delete_range(&repo, &target(), range, &limits(40, 3))
            .await
            .unwrap();

        // 40 ids per slice, 31 ids per statement (32 binds minus the cutoff).
        assert_eq!(summary.deleted, 100);
        assert_eq!(summary.batches, 5);
        assert_eq!(repo.remaining(), 0);
        assert!(
            repo.statements
                .lock()
                .unwrap()
                .iter()
                .all(|s| s.sql.contains(" IN (") && s.binds.len() <= 32)
        );
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let repo = ScriptRepo::new(10, true).failing(0, 2, || {
            DbError::Sqlx(sqlx::Error::PoolTimedOut)
        });
        let range = PurgeRange::new(1, 10).unwrap();

        let summary = delete_range(&repo, &target(), range, &limits(5, 3))
            .await
            .unwrap();

        assert_eq!(summary, DeleteSummary { deleted: 10, batches: 2 });
        assert_eq!(repo.remaining(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_partial_count() {
        // First batch commits, then every attempt fails.
        let repo = ScriptRepo::new(10, true).failing(1, u32::MAX, || {
            DbError::Sqlx(sqlx::Error::PoolTimedOut)
        });
        let range = PurgeRange::new(1, 10).unwrap();

        let err = delete_range(&repo, &target(), range, &limits(4, 2))
            .await
            .unwrap_err();

        match err {
            PurgeError::Deletion {
                category,
                deleted,
                batches,
                source,
            } => {
                assert_eq!(category, Category::Data);
                assert_eq!(deleted, 4);
                assert_eq!(batches, 1);
                assert!(source.is_transient());
            }
            other => panic!("expected deletion error, got {other:?}"),
        }
        assert_eq!(repo.remaining(), 6);
        // Exactly two attempts on the failing batch.
        assert_eq!(repo.failures.load(Ordering::SeqCst), u32::MAX - 2);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_without_retry() {
        let repo = ScriptRepo::new(10, true).failing(0, 1, || DbError::Internal("constraint".into()));
        let range = PurgeRange::new(1, 10).unwrap();

        let err = delete_range(&repo, &target(), range, &limits(5, 5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PurgeError::Deletion {
                deleted: 0,
                batches: 0,
                ..
            }
        ));
        assert_eq!(repo.remaining(), 10);
    }

    #[tokio::test]
    async fn test_rerun_after_failure_resumes() {
        let repo = ScriptRepo::new(9, true).failing(1, 1, || {
            DbError::Sqlx(sqlx::Error::PoolTimedOut)
        });
        let range = PurgeRange::new(1, 9).unwrap();
        let limits = limits(3, 1);

        let err = delete_range(&repo, &target(), range, &limits)
            .await
            .unwrap_err();
        assert_eq!(err.deleted(), 3);
        assert_eq!(repo.remaining(), 6);

        // Rescanned range of the rerun.
        let summary = delete_range(&repo, &target(), PurgeRange::new(4, 9).unwrap(), &limits)
            .await
            .unwrap();
        assert_eq!(summary.deleted, 6);
        assert_eq!(repo.remaining(), 0);
    }
}
