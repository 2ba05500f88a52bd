pub mod dialect;
mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;
pub mod tables;

#[cfg(all(test, any(feature = "database-sqlite", feature = "database-postgres")))]
pub mod tests;

use std::sync::Arc;

pub use dialect::{BindValue, Dialect, DialectError, Predicate, Statement};
pub use error::{DbError, DbResult};
pub use repos::*;
pub use tables::{ReplicationTables, TableRef};

use crate::config::DatabaseConfig;

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(sqlx::PgPool),
    #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
    _None(std::convert::Infallible),
}

/// Database pool holding the replication tables, supporting both SQLite and
/// PostgreSQL.
///
/// The purge repository is created once at construction time.
pub struct DbPool {
    inner: PoolStorage,
    purge: Arc<dyn PurgeRepo>,
    tables: ReplicationTables,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool, range_delete: bool, tables: ReplicationTables) -> Self {
        let purge = Arc::new(sqlite::SqlitePurgeRepo::new(
            pool.clone(),
            sqlite::SqliteDialect::new(range_delete),
        ));
        DbPool {
            inner: PoolStorage::Sqlite(pool),
            purge,
            tables,
        }
    }

    /// Create a DbPool from an existing PostgreSQL pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(pool: sqlx::PgPool, range_delete: bool, tables: ReplicationTables) -> Self {
        let purge = Arc::new(postgres::PostgresPurgeRepo::new(
            pool.clone(),
            postgres::PostgresDialect::new(range_delete),
        ));
        DbPool {
            inner: PoolStorage::Postgres(pool),
            purge,
            tables,
        }
    }

    /// Create a database pool from configuration
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        let tables = ReplicationTables::new(config.table_prefix());
        match config {
            DatabaseConfig::None => Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(cfg.create_if_missing)
                            .journal_mode(if cfg.wal_mode {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
                    )
                    .await?;

                tracing::debug!(path = %cfg.path, prefix = %tables.prefix(), "Connected to SQLite");
                Ok(Self::from_sqlite(pool, config.range_delete(), tables))
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(cfg) => {
                let mut options: sqlx::postgres::PgConnectOptions = cfg.url.parse()?;
                if cfg.statement_timeout_ms > 0 {
                    options = options.options([(
                        "statement_timeout",
                        cfg.statement_timeout_ms.to_string(),
                    )]);
                }

                let pool = sqlx::postgres::PgPoolOptions::new()
                    .min_connections(cfg.min_connections)
                    .max_connections(cfg.max_connections)
                    .acquire_timeout(std::time::Duration::from_secs(cfg.connect_timeout_secs))
                    .idle_timeout(std::time::Duration::from_secs(cfg.idle_timeout_secs))
                    .connect_with(options)
                    .await?;

                tracing::debug!(prefix = %tables.prefix(), "Connected to PostgreSQL");
                Ok(Self::from_postgres(pool, config.range_delete(), tables))
            }
        }
    }

    /// Apply the bundled development schema.
    ///
    /// Production schemas are owned by the replication engine; this exists
    /// for local setups and tests. The bundled schema uses the default table
    /// prefix.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pool) => {
                tracing::info!("Running PostgreSQL migrations");
                sqlx::migrate!("./migrations_sqlx/postgres").run(pool).await?;
                tracing::info!("PostgreSQL migrations completed successfully");
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Get the purge repository
    pub fn purge(&self) -> Arc<dyn PurgeRepo> {
        Arc::clone(&self.purge)
    }

    /// Names of the replication tables in this database
    pub fn tables(&self) -> &ReplicationTables {
        &self.tables
    }
}
