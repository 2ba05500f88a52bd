use crate::db::dialect::Dialect;

/// SQLite dialect.
///
/// SQLite builds used by `sqlx` are compiled without
/// `SQLITE_ENABLE_UPDATE_DELETE_LIMIT`, so `DELETE ... LIMIT` is not assumed.
///
/// Timestamps are TEXT. Rows written by the replication engine use SQLite's
/// `YYYY-MM-DD HH:MM:SS` form while `sqlx` binds RFC 3339, so timestamps are
/// compared through `julianday` rather than as strings.
#[derive(Debug, Clone)]
pub struct SqliteDialect {
    range_delete: bool,
}

/// `SQLITE_MAX_VARIABLE_NUMBER` default since SQLite 3.32.
const SQLITE_MAX_VARIABLES: usize = 32_766;

impl SqliteDialect {
    pub fn new(range_delete: bool) -> Self {
        Self { range_delete }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn max_bind_parameters(&self) -> usize {
        SQLITE_MAX_VARIABLES
    }

    fn supports_range_delete(&self) -> bool {
        self.range_delete
    }

    fn current_timestamp_query(&self) -> &'static str {
        "SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
    }

    fn older_than(&self, column: &str) -> String {
        format!("julianday({column}) < julianday(?)")
    }
}
