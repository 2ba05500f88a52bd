//! Test harness for database repository testing
//!
//! Provides utilities for setting up test databases:
//! - SQLite: Fast in-memory databases with real migrations
//! - PostgreSQL: Testcontainers-based instances with real migrations
//!
//! plus [`ReplicationFixtures`] for populating the replication tables through
//! any [`PurgeRepo`].

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
#[cfg(feature = "database-sqlite")]
use sqlx::SqlitePool;

use crate::{
    db::{BindValue, PurgeRepo, ReplicationTables, Statement, TableRef},
    purge::BatchStatus,
};

/// Create an in-memory SQLite pool for testing
#[cfg(feature = "database-sqlite")]
pub async fn create_sqlite_pool() -> SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Run SQLite migrations on the pool
///
/// Uses the actual migration files to ensure tests match production schema
#[cfg(feature = "database-sqlite")]
pub async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}

/// Rows per multi-row INSERT; keeps every dialect well under its bind limit.
const INSERT_CHUNK: usize = 500;

/// Writes replication rows through a [`PurgeRepo`], so the same fixtures
/// work against every backend.
pub struct ReplicationFixtures<'a> {
    repo: &'a dyn PurgeRepo,
    tables: ReplicationTables,
}

impl<'a> ReplicationFixtures<'a> {
    pub fn new(repo: &'a dyn PurgeRepo) -> Self {
        Self {
            repo,
            tables: ReplicationTables::default(),
        }
    }

    pub fn tables(&self) -> &ReplicationTables {
        &self.tables
    }

    async fn exec(&self, sql: &str, binds: Vec<BindValue>) {
        let statement = Statement {
            sql: self.repo.dialect().render(sql),
            binds,
        };
        self.repo
            .execute_in_transaction(&statement)
            .await
            .expect("Failed to execute fixture statement");
    }

    pub async fn insert_channel(&self, channel_id: &str) {
        let sql = format!(
            "INSERT INTO {} (channel_id, description) VALUES (?, ?)",
            self.tables.channel().name
        );
        self.exec(
            &sql,
            vec![
                BindValue::Text(channel_id.to_string()),
                BindValue::Text(format!("{channel_id} channel")),
            ],
        )
        .await;
    }

    /// Inserts one captured row per id.
    pub async fn insert_data(
        &self,
        ids: RangeInclusive<i64>,
        channel_id: &str,
        create_time: DateTime<Utc>,
    ) {
        let ids: Vec<i64> = ids.collect();
        for chunk in ids.chunks(INSERT_CHUNK) {
            let statement = self.data_insert_statement(chunk, channel_id, create_time);
            self.repo
                .execute_in_transaction(&statement)
                .await
                .expect("Failed to insert data fixtures");
        }
    }

    /// The rendered INSERT for one chunk of captured rows, for callers that
    /// need to run it at a specific point of a purge.
    pub fn data_insert_statement(
        &self,
        ids: &[i64],
        channel_id: &str,
        create_time: DateTime<Utc>,
    ) -> Statement {
        let rows = vec!["(?, ?, ?, ?, ?, ?, ?)"; ids.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} (data_id, table_name, event_type, pk_data, row_data, channel_id, create_time) VALUES {rows}",
            self.tables.data().name
        );
        let binds = ids
            .iter()
            .flat_map(|id| {
                [
                    BindValue::Int(*id),
                    BindValue::Text("item".to_string()),
                    BindValue::Text("I".to_string()),
                    BindValue::Text(format!("\"{id}\"")),
                    BindValue::Text(format!("\"{id}\",\"widget\"")),
                    BindValue::Text(channel_id.to_string()),
                    BindValue::Timestamp(create_time),
                ]
            })
            .collect();
        Statement {
            sql: self.repo.dialect().render(&sql),
            binds,
        }
    }

    /// Inserts a captured row whose `create_time` is stored verbatim, the way
    /// the replication engine writes it on SQLite (`YYYY-MM-DD HH:MM:SS.SSS`).
    pub async fn insert_data_with_text_time(&self, id: i64, channel_id: &str, create_time: &str) {
        let sql = format!(
            "INSERT INTO {} (data_id, table_name, event_type, pk_data, row_data, channel_id, create_time) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.tables.data().name
        );
        self.exec(
            &sql,
            vec![
                BindValue::Int(id),
                BindValue::Text("item".to_string()),
                BindValue::Text("I".to_string()),
                BindValue::Text(format!("\"{id}\"")),
                BindValue::Text(format!("\"{id}\",\"widget\"")),
                BindValue::Text(channel_id.to_string()),
                BindValue::Text(create_time.to_string()),
            ],
        )
        .await;
    }

    pub async fn insert_batch(&self, batch_id: i64, status: BatchStatus, create_time: DateTime<Utc>) {
        let sql = format!(
            "INSERT INTO {} (batch_id, node_id, channel_id, status, create_time) VALUES (?, ?, ?, ?, ?)",
            self.tables.outgoing_batch().name
        );
        self.exec(
            &sql,
            vec![
                BindValue::Int(batch_id),
                BindValue::Text("store-001".to_string()),
                BindValue::Text("default".to_string()),
                BindValue::Text(status.code().to_string()),
                BindValue::Timestamp(create_time),
            ],
        )
        .await;
    }

    pub async fn set_batch_status(&self, batch_id: i64, status: BatchStatus) {
        let sql = format!(
            "UPDATE {} SET status = ? WHERE batch_id = ?",
            self.tables.outgoing_batch().name
        );
        self.exec(
            &sql,
            vec![
                BindValue::Text(status.code().to_string()),
                BindValue::Int(batch_id),
            ],
        )
        .await;
    }

    /// Routes every data row in `data_ids` into `batch_id`.
    pub async fn insert_events(
        &self,
        data_ids: RangeInclusive<i64>,
        batch_id: i64,
        create_time: DateTime<Utc>,
    ) {
        let ids: Vec<i64> = data_ids.collect();
        for chunk in ids.chunks(INSERT_CHUNK) {
            let rows = vec!["(?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} (data_id, batch_id, router_id, create_time) VALUES {rows}",
                self.tables.data_event().name
            );
            let binds = chunk
                .iter()
                .flat_map(|id| {
                    [
                        BindValue::Int(*id),
                        BindValue::Int(batch_id),
                        BindValue::Text("default".to_string()),
                        BindValue::Timestamp(create_time),
                    ]
                })
                .collect();
            self.exec(&sql, binds).await;
        }
    }

    /// Ids currently in `table`, ascending.
    pub async fn ids(&self, table: &TableRef) -> Vec<i64> {
        let sql = format!(
            "SELECT {id} AS id FROM {name} {alias} ORDER BY {id}",
            id = table.qualified_id(),
            name = table.name,
            alias = table.alias,
        );
        self.repo
            .fetch_ids(&Statement {
                sql,
                binds: Vec::new(),
            })
            .await
            .expect("Failed to list fixture ids")
    }

    pub async fn count(&self, table: &TableRef) -> usize {
        self.ids(table).await.len()
    }
}

/// PostgreSQL test harness using testcontainers
#[cfg(all(test, feature = "database-postgres"))]
pub mod postgres {
    use std::sync::OnceLock;

    use sqlx::PgPool;
    use testcontainers_modules::{
        postgres::Postgres,
        testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
    };
    use tokio::sync::OnceCell;

    /// Shared container state - initialized once per test run
    struct SharedContainer {
        #[allow(dead_code)] // Test infrastructure: keeps container alive
        container: ContainerAsync<Postgres>,
        connection_string: String,
    }

    /// Global shared container - lazily initialized on first use
    static SHARED_CONTAINER: OnceLock<OnceCell<SharedContainer>> = OnceLock::new();

    /// Get or initialize the shared PostgreSQL container
    async fn get_shared_container() -> &'static SharedContainer {
        let cell = SHARED_CONTAINER.get_or_init(OnceCell::new);
        cell.get_or_init(|| async {
            let container = Postgres::default()
                .with_tag("17-alpine")
                .start()
                .await
                .expect("Failed to start PostgreSQL container");

            let host = container.get_host().await.expect("Failed to get host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("Failed to get port");

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            SharedContainer {
                container,
                connection_string,
            }
        })
        .await
    }

    /// Create an isolated database schema for a single test
    ///
    /// Starts the shared PostgreSQL container on first use and gives each
    /// test its own schema, so tests get fresh migrations without paying for
    /// a container each.
    pub async fn create_isolated_postgres_pool() -> PgPool {
        let shared = get_shared_container().await;

        let admin_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&shared.connection_string)
            .await
            .expect("Failed to connect to PostgreSQL");

        let schema_name = format!("test_{}", uuid::Uuid::new_v4().simple());

        sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema_name))
            .execute(&admin_pool)
            .await
            .expect("Failed to create test schema");

        // Create a new pool with search_path set to our isolated schema
        let isolated_url = format!(
            "{}?options=-c search_path={}",
            shared.connection_string, schema_name
        );

        sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&isolated_url)
            .await
            .expect("Failed to connect to isolated schema")
    }

    /// Run PostgreSQL migrations on the pool
    pub async fn run_postgres_migrations(pool: &PgPool) {
        sqlx::migrate!("./migrations_sqlx/postgres")
            .run(pool)
            .await
            .expect("Failed to run PostgreSQL migrations");
    }
}
