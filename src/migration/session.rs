// ABOUTME: Narrow connection interfaces used by the relational migration core
// ABOUTME: Lets the orchestrator run against PostgreSQL or in-memory test doubles

use async_trait::async_trait;

use super::planner::DependencyEdge;
use crate::error::Result;

/// One row in the server's text representation; `None` is SQL NULL
pub type TextRow = Vec<Option<String>>;

/// Values of `session_replication_role` toggled by the constraint gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationRole {
    /// Triggers, including foreign-key checks, do not fire
    Replica,
    /// Normal enforcement
    Origin,
}

impl ReplicationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationRole::Replica => "replica",
            ReplicationRole::Origin => "origin",
        }
    }
}

/// Read side of a migration, bound to one source database.
#[async_trait]
pub trait SourceSession: Send {
    /// Names of all non-template databases on the server
    async fn list_databases(&mut self) -> Result<Vec<String>>;

    /// Base tables of `schema`
    async fn list_tables(&mut self, schema: &str) -> Result<Vec<String>>;

    /// One edge per foreign-key constraint inside `schema`
    async fn list_foreign_key_edges(&mut self, schema: &str) -> Result<Vec<DependencyEdge>>;

    /// Start reading `schema.table` and return its column names.
    ///
    /// Rows are then pulled with [`SourceSession::fetch_rows`] until it returns
    /// an empty batch, and the read is ended with [`SourceSession::close_table`].
    async fn open_table(&mut self, schema: &str, table: &str) -> Result<Vec<String>>;

    /// Up to `max_rows` further rows of the open table, in column order
    async fn fetch_rows(&mut self, max_rows: usize) -> Result<Vec<TextRow>>;

    /// End the read started by `open_table`, also after a failed fetch
    async fn close_table(&mut self) -> Result<()>;
}

/// Write side of a migration, bound to one destination database.
///
/// A table is written between `begin_table` and `commit_table`; nothing of it
/// is visible until the commit, and `rollback_table` discards it.
#[async_trait]
pub trait DestinationSession: Send {
    async fn set_replication_role(&mut self, role: ReplicationRole) -> Result<()>;

    async fn begin_table(&mut self, table: &str) -> Result<()>;

    /// Insert one batch of rows, binding values to `columns` by name
    async fn insert_rows(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[TextRow],
    ) -> Result<()>;

    async fn commit_table(&mut self, table: &str) -> Result<()>;

    async fn rollback_table(&mut self, table: &str) -> Result<()>;
}

/// Opens per-database sessions on the source and destination servers.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Source: SourceSession;
    type Destination: DestinationSession;

    async fn open_source(&self, database: &str) -> Result<Self::Source>;

    async fn open_destination(&self, database: &str) -> Result<Self::Destination>;
}
