//! Purge worker for running the purge operations on a schedule.
//!
//! Each operation gets its own ticker. Runs are spawned onto a task tracker
//! so a slow run does not delay the ticker of the same operation; the
//! [`SingleFlight`] guard turns the overlapping tick into a no-op instead.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::MissedTickBehavior,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::RetentionConfig,
    observability::metrics,
    purge::{PurgeOperation, PurgeService},
};

/// One mutual-exclusion slot per purge operation.
///
/// Holding the guard returned by [`SingleFlight::try_acquire`] marks the
/// operation as running until the guard is dropped.
#[derive(Debug, Default)]
pub struct SingleFlight {
    incoming: Arc<Mutex<()>>,
    outgoing: Arc<Mutex<()>>,
}

impl SingleFlight {
    /// Returns `None` when a run of `operation` is already in progress.
    pub fn try_acquire(&self, operation: PurgeOperation) -> Option<OwnedMutexGuard<()>> {
        let slot = match operation {
            PurgeOperation::Incoming => &self.incoming,
            PurgeOperation::Outgoing => &self.outgoing,
        };
        Arc::clone(slot).try_lock_owned().ok()
    }
}

/// Starts the purge worker.
///
/// The worker runs until `shutdown` is cancelled. A run in progress at that
/// point is dropped between statements: its open transaction rolls back and
/// every committed batch stays deleted.
pub async fn start_purge_worker(
    service: PurgeService,
    config: RetentionConfig,
    shutdown: CancellationToken,
) {
    if !config.enabled {
        tracing::info!("Purge worker disabled by configuration");
        return;
    }

    tracing::info!(
        incoming_interval_secs = config.incoming_interval_secs,
        outgoing_interval_secs = config.outgoing_interval_secs,
        "Starting purge worker"
    );

    let flights = Arc::new(SingleFlight::default());
    let tracker = TaskTracker::new();

    tokio::join!(
        schedule(
            &service,
            PurgeOperation::Incoming,
            config.incoming_interval(),
            &flights,
            &tracker,
            &shutdown,
        ),
        schedule(
            &service,
            PurgeOperation::Outgoing,
            config.outgoing_interval(),
            &flights,
            &tracker,
            &shutdown,
        ),
    );

    tracker.close();
    tracker.wait().await;
    tracing::info!("Purge worker stopped");
}

async fn schedule(
    service: &PurgeService,
    operation: PurgeOperation,
    every: Duration,
    flights: &Arc<SingleFlight>,
    tracker: &TaskTracker,
    shutdown: &CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(flight) = flights.try_acquire(operation) else {
            tracing::warn!(
                operation = %operation,
                "Previous purge still running, skipping this run"
            );
            metrics::record_purge_overlap(operation.as_str());
            continue;
        };

        let service = service.clone();
        let shutdown = shutdown.clone();
        tracker.spawn(async move {
            let _flight = flight;
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!(operation = %operation, "Purge interrupted by shutdown");
                }
                result = service.purge(operation, None) => log_run(operation, result),
            }
        });
    }
}

fn log_run(
    operation: PurgeOperation,
    result: Result<crate::purge::PurgeReport, crate::purge::PurgeError>,
) {
    match result {
        Ok(report) if report.is_complete() => {
            if report.total_deleted() > 0 {
                tracing::info!(
                    operation = %operation,
                    deleted = report.total_deleted(),
                    "Scheduled purge complete"
                );
            } else {
                tracing::debug!(operation = %operation, "Scheduled purge complete, no rows to delete");
            }
        }
        Ok(report) => {
            tracing::warn!(
                operation = %operation,
                deleted = report.total_deleted(),
                error = report.error().map(tracing::field::display),
                "Scheduled purge stopped early"
            );
        }
        Err(e) => {
            tracing::error!(operation = %operation, error = %e, "Error running scheduled purge");
        }
    }
}
