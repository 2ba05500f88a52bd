//! Eligibility predicates and the min/max range scan.
//!
//! A row is a purge candidate when it is older than its category's cutoff and
//! nothing that replication still needs refers to it:
//!
//! | Category         | Protected while                                              |
//! |------------------|--------------------------------------------------------------|
//! | `outgoing_batch` | status is not terminal, or any `data_event` still points at it |
//! | `data_event`     | any event of the same `data_id` sits in a non-terminal batch  |
//! | `data`           | any `data_event` points at it, or its channel is unknown      |
//! | `stranded_data`  | any `data_event` points at it, or its channel exists          |
//!
//! Events go before their data rows and before their batches, so purging
//! `data_event` first is what frees the other categories. The predicates do
//! not depend on cascading deletes.
//!
//! Known limitation: once its events are purged, a `data` row cannot be told
//! apart from one that was never routed. If routing stalls for longer than
//! the `data` retention window, captured changes that were never delivered
//! are purged as ordinary `data`.

use chrono::{DateTime, Utc};

use super::{BatchStatus, Category, PurgeRange, RetentionCutoff};
use crate::db::{BindValue, DbResult, Dialect, Predicate, PurgeRepo, ReplicationTables};

/// Rows of `category` that may be deleted for the given cutoff.
///
/// The predicate is written against the alias of [`Category::table`]; the
/// cutoff comparison is left to `dialect`.
pub fn eligibility_predicate(
    dialect: &dyn Dialect,
    category: Category,
    tables: &ReplicationTables,
    cutoff: DateTime<Utc>,
) -> Predicate {
    let data_event = tables.data_event().name;
    let outgoing_batch = tables.outgoing_batch().name;
    let channel = tables.channel().name;
    let terminal = BatchStatus::terminal_sql_list();
    let table = category.table(tables);
    let older = dialect.older_than(&format!("{}.create_time", table.alias));

    let sql = match category {
        Category::OutgoingBatch => format!(
            "{older} \
             AND b.status IN ({terminal}) \
             AND NOT EXISTS (SELECT 1 FROM {data_event} e WHERE e.batch_id = b.batch_id)"
        ),
        Category::DataEvent => format!(
            "{older} \
             AND NOT EXISTS (\
             SELECT 1 FROM {data_event} pe \
             JOIN {outgoing_batch} pb ON pb.batch_id = pe.batch_id \
             WHERE pe.data_id = e.data_id AND pb.status NOT IN ({terminal}))"
        ),
        Category::Data => format!(
            "{older} \
             AND NOT EXISTS (SELECT 1 FROM {data_event} e WHERE e.data_id = d.data_id) \
             AND EXISTS (SELECT 1 FROM {channel} c WHERE c.channel_id = d.channel_id)"
        ),
        Category::StrandedData => format!(
            "{older} \
             AND NOT EXISTS (SELECT 1 FROM {data_event} e WHERE e.data_id = d.data_id) \
             AND NOT EXISTS (SELECT 1 FROM {channel} c WHERE c.channel_id = d.channel_id)"
        ),
    };

    Predicate::new(sql, vec![BindValue::Timestamp(cutoff)])
}

/// Smallest id range containing every purge candidate of the cutoff's
/// category, or `None` when there is none.
///
/// Issues exactly one query. Ids are fixed by this scan: rows inserted
/// afterwards are either beyond `max_id` or re-checked by every delete.
pub async fn compute_range(
    repo: &dyn PurgeRepo,
    tables: &ReplicationTables,
    cutoff: &RetentionCutoff,
) -> DbResult<Option<PurgeRange>> {
    let table = cutoff.category.table(tables);
    let dialect = repo.dialect();
    let predicate = eligibility_predicate(dialect, cutoff.category, tables, cutoff.cutoff);
    let statement = dialect.min_max_query(&table, &predicate);

    let range = repo
        .fetch_min_max(&statement)
        .await?
        .and_then(|(min_id, max_id)| PurgeRange::new(min_id, max_id));

    tracing::debug!(
        category = %cutoff.category,
        cutoff = %cutoff.cutoff,
        min_id = range.map(|r| r.min_id()),
        max_id = range.map(|r| r.max_id()),
        span = range.map(|r| r.span()),
        "Computed purge range"
    );

    Ok(range)
}
