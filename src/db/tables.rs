//! Names of the replication tables the purge engine works on.
//!
//! The replication engine creates its tables with a configurable prefix
//! (`sym_data`, `sym_data_event`, ...). The prefix is validated as a plain
//! identifier when the configuration is loaded, since table names end up
//! interpolated into SQL text.

/// A table as seen by statement builders: its name, the alias predicates use
/// for it, and the integer primary key the purge ranges are expressed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: &'static str,
    pub id_column: &'static str,
}

impl TableRef {
    /// `alias.id_column`
    pub fn qualified_id(&self) -> String {
        format!("{}.{}", self.alias, self.id_column)
    }
}

/// The full set of replication tables for one table prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationTables {
    prefix: String,
}

impl ReplicationTables {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Captured change rows.
    pub fn data(&self) -> TableRef {
        TableRef {
            name: format!("{}_data", self.prefix),
            alias: "d",
            id_column: "data_id",
        }
    }

    /// Routing of captured rows into outgoing batches.
    pub fn data_event(&self) -> TableRef {
        TableRef {
            name: format!("{}_data_event", self.prefix),
            alias: "e",
            id_column: "event_id",
        }
    }

    /// Units of work sent to remote nodes.
    pub fn outgoing_batch(&self) -> TableRef {
        TableRef {
            name: format!("{}_outgoing_batch", self.prefix),
            alias: "b",
            id_column: "batch_id",
        }
    }

    /// Configured replication channels.
    pub fn channel(&self) -> TableRef {
        TableRef {
            name: format!("{}_channel", self.prefix),
            alias: "c",
            id_column: "channel_id",
        }
    }
}

impl Default for ReplicationTables {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TABLE_PREFIX)
    }
}
