use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

use super::{
    BatchLimits, Category, PurgeError, PurgeRange, RetentionCutoff, RetentionPolicy,
    deleter::{self, DeleteTarget},
    range,
};
use crate::{
    db::{DbError, PurgeRepo, ReplicationTables},
    observability::metrics,
    parameters::ParameterService,
};

/// The two purge jobs. Each one covers a fixed sequence of categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurgeOperation {
    /// Routing rows, then the captured rows they freed.
    Incoming,
    /// Delivered batches, then stranded captured rows.
    Outgoing,
}

impl PurgeOperation {
    /// Categories in the order they are purged.
    pub fn categories(&self) -> &'static [Category] {
        match self {
            PurgeOperation::Incoming => &[Category::DataEvent, Category::Data],
            PurgeOperation::Outgoing => &[Category::OutgoingBatch, Category::StrandedData],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeOperation::Incoming => "incoming",
            PurgeOperation::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for PurgeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a category ended within one purge run.
#[derive(Debug)]
pub enum CategoryStatus {
    /// Every candidate of the scanned range was deleted.
    Completed,
    /// The retention window is zero or negative, or the category is switched off.
    Disabled,
    /// No row qualified.
    Empty,
    /// Dry-run mode: the range was scanned but nothing was deleted.
    DryRun { range: PurgeRange },
    /// The category's parameters are invalid; later categories still ran.
    Skipped(PurgeError),
    /// The category failed part-way; later categories did not run.
    Failed(PurgeError),
}

#[derive(Debug)]
pub struct CategoryOutcome {
    pub category: Category,
    /// `None` when no cutoff could be established.
    pub cutoff: Option<DateTime<Utc>>,
    /// Rows committed, including the partial count of a failed category.
    pub deleted: u64,
    pub batches: u32,
    pub status: CategoryStatus,
}

impl CategoryOutcome {
    fn new(category: Category, cutoff: Option<DateTime<Utc>>, status: CategoryStatus) -> Self {
        Self {
            category,
            cutoff,
            deleted: 0,
            batches: 0,
            status,
        }
    }

    pub fn error(&self) -> Option<&PurgeError> {
        match &self.status {
            CategoryStatus::Skipped(err) | CategoryStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Result of one purge operation: a deleted-row count plus whether the run
/// completed cleanly or stopped early.
#[derive(Debug)]
pub struct PurgeReport {
    pub operation: PurgeOperation,
    pub outcomes: Vec<CategoryOutcome>,
}

impl PurgeReport {
    pub fn total_deleted(&self) -> u64 {
        self.outcomes.iter().map(|o| o.deleted).sum()
    }

    /// True when no category was skipped or failed.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.error().is_none())
    }

    /// The first error of the run, if any.
    pub fn error(&self) -> Option<&PurgeError> {
        self.outcomes.iter().find_map(CategoryOutcome::error)
    }

    pub fn outcome(&self, category: Category) -> Option<&CategoryOutcome> {
        self.outcomes.iter().find(|o| o.category == category)
    }

    /// `Ok(total_deleted)` for a complete run, otherwise the first error.
    pub fn into_result(self) -> Result<u64, PurgeError> {
        let total = self.total_deleted();
        match self
            .outcomes
            .into_iter()
            .find_map(|o| match o.status {
                CategoryStatus::Skipped(err) | CategoryStatus::Failed(err) => Some(err),
                _ => None,
            }) {
            Some(err) => Err(err),
            None => Ok(total),
        }
    }
}

/// Rejects a caller-supplied cutoff later than the database server clock.
pub fn validate_cutoff(cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), PurgeError> {
    if cutoff > now {
        return Err(PurgeError::InvalidArgument(format!(
            "cutoff {cutoff} is later than the database server time {now}"
        )));
    }
    Ok(())
}

/// Entry point for purging replication history.
///
/// Holds no mutable state, so one instance can serve several callers. Two
/// runs of the same operation must not overlap; the retention worker keeps
/// them apart.
#[derive(Clone)]
pub struct PurgeService {
    repo: Arc<dyn PurgeRepo>,
    policy: RetentionPolicy,
    tables: Arc<ReplicationTables>,
}

impl PurgeService {
    pub fn new(
        repo: Arc<dyn PurgeRepo>,
        params: Arc<dyn ParameterService>,
        tables: ReplicationTables,
    ) -> Self {
        Self {
            repo,
            policy: RetentionPolicy::new(params),
            tables: Arc::new(tables),
        }
    }

    /// Purges `data_event` then `data` using their configured retention.
    pub async fn purge_incoming(&self) -> Result<PurgeReport, PurgeError> {
        self.purge(PurgeOperation::Incoming, None).await
    }

    /// Purges `outgoing_batch`, then stranded `data` when enabled, using
    /// their configured retention.
    pub async fn purge_outgoing(&self) -> Result<PurgeReport, PurgeError> {
        self.purge(PurgeOperation::Outgoing, None).await
    }

    /// Like [`purge_incoming`](Self::purge_incoming) with `cutoff` for every
    /// category instead of the retention windows.
    pub async fn purge_incoming_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<PurgeReport, PurgeError> {
        self.purge(PurgeOperation::Incoming, Some(cutoff)).await
    }

    /// Like [`purge_outgoing`](Self::purge_outgoing) with `cutoff` for every
    /// category instead of the retention windows.
    pub async fn purge_outgoing_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<PurgeReport, PurgeError> {
        self.purge(PurgeOperation::Outgoing, Some(cutoff)).await
    }

    /// Runs `operation` with an explicit cutoff, or with the configured
    /// retention windows when `cutoff` is `None`.
    ///
    /// Fails only before anything was deleted: when the explicit cutoff is in
    /// the future or the server clock cannot be read. Every other problem is
    /// reported per category in the returned [`PurgeReport`].
    #[tracing::instrument(skip(self, operation), fields(operation = %operation))]
    pub async fn purge(
        &self,
        operation: PurgeOperation,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<PurgeReport, PurgeError> {
        let now = self.repo.server_time().await?;
        if let Some(cutoff) = cutoff {
            validate_cutoff(cutoff, now)?;
        }

        let mut report = PurgeReport {
            operation,
            outcomes: Vec::with_capacity(operation.categories().len()),
        };

        for &category in operation.categories() {
            let outcome = self.purge_category(category, cutoff, now).await;
            log_outcome(&outcome);
            metrics::record_purge_deletion(category.as_str(), outcome.deleted);

            let stop = matches!(outcome.status, CategoryStatus::Failed(_));
            report.outcomes.push(outcome);
            if stop {
                break;
            }
        }

        tracing::info!(
            deleted = report.total_deleted(),
            complete = report.is_complete(),
            "Purge {} finished",
            operation
        );
        Ok(report)
    }

    async fn purge_category(
        &self,
        category: Category,
        explicit: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CategoryOutcome {
        let cutoff = match self.resolve_cutoff(category, explicit, now) {
            Ok(Some(cutoff)) => cutoff,
            Ok(None) => return CategoryOutcome::new(category, None, CategoryStatus::Disabled),
            Err(err) => return CategoryOutcome::new(category, None, CategoryStatus::Skipped(err)),
        };
        let at = Some(cutoff.cutoff);

        let (limits, dry_run) = match self.run_settings() {
            Ok(settings) => settings,
            Err(err) => return CategoryOutcome::new(category, at, CategoryStatus::Skipped(err)),
        };

        let range = match range::compute_range(self.repo.as_ref(), &self.tables, &cutoff).await {
            Ok(Some(range)) => range,
            Ok(None) => return CategoryOutcome::new(category, at, CategoryStatus::Empty),
            Err(source @ DbError::Unsupported { .. }) => {
                metrics::record_purge_failure(category.as_str());
                let err = PurgeError::Unsupported { category, source };
                return CategoryOutcome::new(category, at, CategoryStatus::Failed(err));
            }
            Err(err) => {
                metrics::record_purge_failure(category.as_str());
                return CategoryOutcome::new(category, at, CategoryStatus::Failed(err.into()));
            }
        };

        if dry_run {
            return CategoryOutcome::new(category, at, CategoryStatus::DryRun { range });
        }

        let target = DeleteTarget {
            category,
            table: category.table(&self.tables),
            predicate: range::eligibility_predicate(
                self.repo.dialect(),
                category,
                &self.tables,
                cutoff.cutoff,
            ),
        };

        match deleter::delete_range(self.repo.as_ref(), &target, range, &limits).await {
            Ok(summary) => CategoryOutcome {
                category,
                cutoff: at,
                deleted: summary.deleted,
                batches: summary.batches,
                status: CategoryStatus::Completed,
            },
            Err(err) => CategoryOutcome {
                category,
                cutoff: at,
                deleted: err.deleted(),
                batches: err.batches(),
                status: CategoryStatus::Failed(err),
            },
        }
    }

    fn resolve_cutoff(
        &self,
        category: Category,
        explicit: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<RetentionCutoff>, PurgeError> {
        if category == Category::StrandedData && !self.policy.stranded_enabled()? {
            return Ok(None);
        }
        match explicit {
            Some(cutoff) => Ok(Some(RetentionCutoff { category, cutoff })),
            None => self.policy.resolve_cutoff(category, now),
        }
    }

    fn run_settings(&self) -> Result<(BatchLimits, bool), PurgeError> {
        Ok((self.policy.batch_limits()?, self.policy.dry_run()?))
    }
}

fn log_outcome(outcome: &CategoryOutcome) {
    let category = outcome.category.as_str();
    let cutoff = outcome.cutoff.map(|c| c.to_rfc3339());
    match &outcome.status {
        CategoryStatus::Completed => tracing::info!(
            category,
            cutoff,
            deleted = outcome.deleted,
            batches = outcome.batches,
            "Purged {}",
            category
        ),
        CategoryStatus::Disabled => {
            tracing::debug!(category, "Purge of {} disabled", category)
        }
        CategoryStatus::Empty => {
            tracing::debug!(category, cutoff, "Nothing to purge for {}", category)
        }
        CategoryStatus::DryRun { range } => tracing::info!(
            category,
            cutoff,
            min_id = range.min_id(),
            max_id = range.max_id(),
            "DRY RUN: Would purge {} rows in id range {}..={}",
            category,
            range.min_id(),
            range.max_id()
        ),
        CategoryStatus::Skipped(err) => {
            tracing::warn!(category, error = %err, "Skipping purge of {}", category)
        }
        CategoryStatus::Failed(err) => tracing::error!(
            category,
            cutoff,
            deleted = outcome.deleted,
            error = %err,
            "Purge of {} stopped early",
            category
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_cutoff_in_the_future_is_rejected() {
        let now = Utc::now();
        let err = validate_cutoff(now + TimeDelta::milliseconds(1), now).unwrap_err();
        assert!(matches!(err, PurgeError::InvalidArgument(_)));

        assert!(validate_cutoff(now, now).is_ok());
        assert!(validate_cutoff(now - TimeDelta::days(30), now).is_ok());
    }

    #[test]
    fn test_operation_order() {
        assert_eq!(
            PurgeOperation::Incoming.categories(),
            &[Category::DataEvent, Category::Data]
        );
        assert_eq!(
            PurgeOperation::Outgoing.categories(),
            &[Category::OutgoingBatch, Category::StrandedData]
        );
    }

    fn outcome(category: Category, deleted: u64, status: CategoryStatus) -> CategoryOutcome {
        CategoryOutcome {
            category,
            cutoff: Some(Utc::now()),
            deleted,
            batches: 1,
            status,
        }
    }

    #[test]
    fn test_complete_report() {
        let report = PurgeReport {
            operation: PurgeOperation::Incoming,
            outcomes: vec![
                outcome(Category::DataEvent, 12, CategoryStatus::Completed),
                outcome(Category::Data, 0, CategoryStatus::Empty),
            ],
        };
        assert!(report.is_complete());
        assert!(report.error().is_none());
        assert_eq!(report.outcome(Category::DataEvent).unwrap().deleted, 12);
        assert_eq!(report.into_result().unwrap(), 12);
    }

    #[test]
    fn test_incomplete_report_keeps_partial_count() {
        let report = PurgeReport {
            operation: PurgeOperation::Outgoing,
            outcomes: vec![
                outcome(
                    Category::OutgoingBatch,
                    7,
                    CategoryStatus::Failed(PurgeError::Deletion {
                        category: Category::OutgoingBatch,
                        deleted: 7,
                        batches: 2,
                        source: DbError::Internal("lost connection".into()),
                    }),
                ),
            ],
        };
        assert!(!report.is_complete());
        assert_eq!(report.total_deleted(), 7);
        assert!(matches!(report.error(), Some(PurgeError::Deletion { .. })));
        assert_eq!(report.into_result().unwrap_err().deleted(), 7);
    }

    #[test]
    fn test_skipped_category_is_incomplete() {
        let report = PurgeReport {
            operation: PurgeOperation::Incoming,
            outcomes: vec![
                outcome(
                    Category::DataEvent,
                    0,
                    CategoryStatus::Skipped(PurgeError::Configuration("bad".into())),
                ),
                outcome(Category::Data, 3, CategoryStatus::Completed),
            ],
        };
        assert!(!report.is_complete());
        assert_eq!(report.total_deleted(), 3);
        assert!(matches!(
            report.into_result(),
            Err(PurgeError::Configuration(_))
        ));
    }
}
