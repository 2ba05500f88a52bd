use crate::db::dialect::Dialect;

/// PostgreSQL dialect.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    range_delete: bool,
}

/// Bind parameters are counted in an `Int16` on the wire.
const POSTGRES_MAX_BIND_PARAMETERS: usize = 65_535;

impl PostgresDialect {
    pub fn new(range_delete: bool) -> Self {
        Self { range_delete }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn max_bind_parameters(&self) -> usize {
        POSTGRES_MAX_BIND_PARAMETERS
    }

    fn supports_range_delete(&self) -> bool {
        self.range_delete
    }

    fn current_timestamp_query(&self) -> &'static str {
        "SELECT now()"
    }
}
