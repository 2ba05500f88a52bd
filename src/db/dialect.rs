//! SQL dialect abstraction.
//!
//! A [`Dialect`] translates purge requests into statements for one database
//! engine. It holds no connection and makes no decisions about *what* is
//! eligible for deletion; callers pass the eligibility [`Predicate`] in and
//! get a [`Statement`] back.
//!
//! Builders write `?` as a dialect-neutral bind marker. [`Dialect::render`]
//! rewrites the markers into the engine's placeholder syntax, so the bind
//! list of a [`Statement`] is always in textual order.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{DbError, tables::TableRef};

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Int(i64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

/// A rendered SQL statement and its bind values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

/// A boolean SQL fragment over a table alias, with its own bind values.
///
/// The fragment uses `?` markers; it is embedded into statements before
/// rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, binds: Vec<BindValue>) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DialectError {
    #[error("{dialect} dialect does not support {operation}")]
    Unsupported {
        dialect: &'static str,
        operation: String,
    },
}

impl From<DialectError> for DbError {
    fn from(err: DialectError) -> Self {
        match err {
            DialectError::Unsupported { dialect, operation } => {
                DbError::Unsupported { dialect, operation }
            }
        }
    }
}

/// Per-engine SQL translation.
///
/// Implementations only describe their capabilities and placeholder syntax;
/// the statement builders have shared default implementations that honour
/// those capabilities.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Short engine name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Placeholder for the `index`-th bind value (1-based).
    fn placeholder(&self, index: usize) -> String;

    /// Maximum number of bind values a single statement may carry.
    fn max_bind_parameters(&self) -> usize;

    /// Whether a delete may combine an id range with the eligibility
    /// predicate in one statement. When false, deletes go through
    /// [`Dialect::select_ids_in_range`] and [`Dialect::delete_ids_statement`].
    fn supports_range_delete(&self) -> bool;

    /// Whether `DELETE ... LIMIT n` is accepted.
    fn supports_delete_limit(&self) -> bool {
        false
    }

    /// Query returning the database server's current time as a single column.
    fn current_timestamp_query(&self) -> &'static str;

    /// Condition that `column` holds a timestamp strictly before the single
    /// bound `?` marker.
    fn older_than(&self, column: &str) -> String {
        format!("{column} < ?")
    }

    /// Rewrites `?` markers into this dialect's placeholders.
    fn render(&self, sql: &str) -> String {
        let mut rendered = String::with_capacity(sql.len() + 16);
        let mut index = 0;
        for ch in sql.chars() {
            if ch == '?' {
                index += 1;
                rendered.push_str(&self.placeholder(index));
            } else {
                rendered.push(ch);
            }
        }
        rendered
    }

    /// `SELECT MIN(id), MAX(id)` over the rows matching `predicate`.
    ///
    /// The result columns are named `min_id` and `max_id`; both are NULL when
    /// no row matches.
    fn min_max_query(&self, table: &TableRef, predicate: &Predicate) -> Statement {
        let id = table.qualified_id();
        let sql = format!(
            "SELECT MIN({id}) AS min_id, MAX({id}) AS max_id FROM {name} {alias} WHERE {predicate}",
            name = table.name,
            alias = table.alias,
            predicate = predicate.sql,
        );
        Statement {
            sql: self.render(&sql),
            binds: predicate.binds.clone(),
        }
    }

    /// Deletes the rows with ids in `[min_id, max_id]` that match `predicate`.
    fn delete_range_statement(
        &self,
        table: &TableRef,
        min_id: i64,
        max_id: i64,
        predicate: &Predicate,
    ) -> Result<Statement, DialectError> {
        if !self.supports_range_delete() {
            return Err(DialectError::Unsupported {
                dialect: self.name(),
                operation: format!("ranged delete on {}", table.name),
            });
        }

        let mut sql = format!(
            "DELETE FROM {name} AS {alias} WHERE {id} BETWEEN ? AND ? AND ({predicate})",
            name = table.name,
            alias = table.alias,
            id = table.qualified_id(),
            predicate = predicate.sql,
        );
        let mut binds = Vec::with_capacity(predicate.binds.len() + 3);
        binds.push(BindValue::Int(min_id));
        binds.push(BindValue::Int(max_id));
        binds.extend(predicate.binds.iter().cloned());

        if self.supports_delete_limit() {
            sql.push_str(" LIMIT ?");
            binds.push(BindValue::Int(max_id - min_id + 1));
        }

        Ok(Statement {
            sql: self.render(&sql),
            binds,
        })
    }

    /// Ids in `[min_id, max_id]` matching `predicate`, ascending, in a column
    /// named `id`.
    fn select_ids_in_range(
        &self,
        table: &TableRef,
        min_id: i64,
        max_id: i64,
        predicate: &Predicate,
    ) -> Statement {
        let id = table.qualified_id();
        let sql = format!(
            "SELECT {id} AS id FROM {name} {alias} WHERE {id} BETWEEN ? AND ? AND ({predicate}) ORDER BY {id}",
            name = table.name,
            alias = table.alias,
            predicate = predicate.sql,
        );
        let mut binds = Vec::with_capacity(predicate.binds.len() + 2);
        binds.push(BindValue::Int(min_id));
        binds.push(BindValue::Int(max_id));
        binds.extend(predicate.binds.iter().cloned());
        Statement {
            sql: self.render(&sql),
            binds,
        }
    }

    /// Deletes the listed ids, re-checking `predicate` so rows that became
    /// protected since they were selected survive.
    fn delete_ids_statement(
        &self,
        table: &TableRef,
        ids: &[i64],
        predicate: &Predicate,
    ) -> Result<Statement, DialectError> {
        let bind_count = ids.len() + predicate.binds.len();
        if ids.is_empty() || bind_count > self.max_bind_parameters() {
            return Err(DialectError::Unsupported {
                dialect: self.name(),
                operation: format!(
                    "deleting {} ids from {} in one statement",
                    ids.len(),
                    table.name
                ),
            });
        }

        let markers = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM {name} AS {alias} WHERE {id} IN ({markers}) AND ({predicate})",
            name = table.name,
            alias = table.alias,
            id = table.qualified_id(),
            predicate = predicate.sql,
        );
        let mut binds = Vec::with_capacity(bind_count);
        binds.extend(ids.iter().map(|id| BindValue::Int(*id)));
        binds.extend(predicate.binds.iter().cloned());
        Ok(Statement {
            sql: self.render(&sql),
            binds,
        })
    }
}
