use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, query::Query, sqlite::SqliteArguments};

use super::SqliteDialect;
use crate::db::{
    dialect::{BindValue, Dialect, Statement},
    error::{DbError, DbResult},
    repos::{PurgeRepo, min_max_pair},
};

pub struct SqlitePurgeRepo {
    pool: SqlitePool,
    dialect: SqliteDialect,
}

impl SqlitePurgeRepo {
    pub fn new(pool: SqlitePool, dialect: SqliteDialect) -> Self {
        Self { pool, dialect }
    }
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: &'q [BindValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in binds {
        query = match value {
            BindValue::Int(v) => query.bind(*v),
            BindValue::Timestamp(ts) => query.bind(*ts),
            BindValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

#[async_trait]
impl PurgeRepo for SqlitePurgeRepo {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn server_time(&self) -> DbResult<DateTime<Utc>> {
        let now: String = sqlx::query_scalar(self.dialect.current_timestamp_query())
            .fetch_one(&self.pool)
            .await?;

        DateTime::parse_from_rfc3339(&now)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| DbError::Internal(format!("Invalid server time '{now}': {e}")))
    }

    async fn fetch_min_max(&self, statement: &Statement) -> DbResult<Option<(i64, i64)>> {
        let row = bind_values(sqlx::query(&statement.sql), &statement.binds)
            .fetch_one(&self.pool)
            .await?;

        min_max_pair(row.try_get("min_id")?, row.try_get("max_id")?)
    }

    async fn fetch_ids(&self, statement: &Statement) -> DbResult<Vec<i64>> {
        let rows = bind_values(sqlx::query(&statement.sql), &statement.binds)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(DbError::from))
            .collect()
    }

    async fn execute_in_transaction(&self, statement: &Statement) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;

        let result = bind_values(sqlx::query(&statement.sql), &statement.binds)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
