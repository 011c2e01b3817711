// ABOUTME: PostgreSQL implementations of the migration session interfaces
// ABOUTME: Streams text rows through a source cursor into batched inserts on the destination

use async_trait::async_trait;
use tokio_postgres::{Client, SimpleQueryMessage};

use super::connection::{connect_with_retry, describe_pg_error};
use crate::config::PostgresEndpoint;
use crate::error::{MigrateError, Result};
use crate::migration::catalog;
use crate::migration::copier::{build_insert_statement, build_select_statement};
use crate::migration::planner::DependencyEdge;
use crate::migration::session::{
    DestinationSession, ReplicationRole, SessionFactory, SourceSession, TextRow,
};
use crate::utils::qualified_table;

/// Cursor holding the rows of the table being read
const ROW_CURSOR: &str = "db_migrator_rows";

/// Source connection bound to one database
pub struct PostgresSource {
    client: Client,
    database: String,
}

impl PostgresSource {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    async fn column_names(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let describe = format!("SELECT * FROM {}", qualified_table(schema, table));
        let statement = self.client.prepare(&describe).await.map_err(|e| {
            MigrateError::query(
                format!("describe table '{}' in '{}'", table, self.database),
                describe_pg_error(&e),
            )
        })?;

        Ok(statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect())
    }
}

#[async_trait]
impl SourceSession for PostgresSource {
    async fn list_databases(&mut self) -> Result<Vec<String>> {
        catalog::list_databases(&self.client).await
    }

    async fn list_tables(&mut self, schema: &str) -> Result<Vec<String>> {
        catalog::list_tables(&self.client, schema).await
    }

    async fn list_foreign_key_edges(&mut self, schema: &str) -> Result<Vec<DependencyEdge>> {
        catalog::list_foreign_key_edges(&self.client, schema).await
    }

    async fn open_table(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        let columns = self.column_names(schema, table).await?;

        // The cursor lives in a read-only snapshot so batches see one consistent table.
        let declare = format!(
            "BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY; DECLARE {} NO SCROLL CURSOR FOR {}",
            ROW_CURSOR,
            build_select_statement(schema, table, &columns)
        );
        if let Err(e) = self.client.batch_execute(&declare).await {
            if let Err(rollback_err) = self.client.batch_execute("ROLLBACK").await {
                tracing::warn!("Failed to end read of '{}': {}", table, rollback_err);
            }
            return Err(MigrateError::query(
                format!("read table '{}' in '{}'", table, self.database),
                describe_pg_error(&e),
            ));
        }

        Ok(columns)
    }

    async fn fetch_rows(&mut self, max_rows: usize) -> Result<Vec<TextRow>> {
        // Simple query protocol returns every value in its text form.
        let fetch = format!("FETCH FORWARD {} FROM {}", max_rows, ROW_CURSOR);
        let messages = self.client.simple_query(&fetch).await.map_err(|e| {
            MigrateError::query(
                format!("fetch rows in '{}'", self.database),
                describe_pg_error(&e),
            )
        })?;

        Ok(messages
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => {
                    Some((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect())
                }
                _ => None,
            })
            .collect())
    }

    async fn close_table(&mut self) -> Result<()> {
        // Read only, so ROLLBACK ends the snapshot and also clears a failed FETCH.
        self.client.batch_execute("ROLLBACK").await.map_err(|e| {
            MigrateError::query(
                format!("end read in '{}'", self.database),
                describe_pg_error(&e),
            )
        })
    }
}

/// Destination connection bound to one database
pub struct PostgresDestination {
    client: Client,
    database: String,
}

impl PostgresDestination {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    async fn execute(&self, sql: &str, context: impl FnOnce() -> String) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| MigrateError::query(context(), describe_pg_error(&e)))
    }
}

#[async_trait]
impl DestinationSession for PostgresDestination {
    async fn set_replication_role(&mut self, role: ReplicationRole) -> Result<()> {
        let sql = format!("SET session_replication_role = '{}'", role.as_str());
        self.client.batch_execute(&sql).await.map_err(|e| {
            MigrateError::query(
                format!(
                    "set session_replication_role to {} in '{}'",
                    role.as_str(),
                    self.database
                ),
                describe_pg_error(&e),
            )
        })
    }

    async fn begin_table(&mut self, table: &str) -> Result<()> {
        self.execute("BEGIN", || format!("begin copy of '{}'", table)).await
    }

    async fn insert_rows(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[TextRow],
    ) -> Result<()> {
        let sql = build_insert_statement(schema, table, columns, rows);
        self.execute(&sql, || format!("insert into '{}' in '{}'", table, self.database))
            .await
    }

    async fn commit_table(&mut self, table: &str) -> Result<()> {
        self.execute("COMMIT", || format!("commit copy of '{}'", table)).await
    }

    async fn rollback_table(&mut self, table: &str) -> Result<()> {
        self.execute("ROLLBACK", || format!("roll back copy of '{}'", table))
            .await
    }
}

/// Opens PostgreSQL sessions for each database of a run
pub struct PostgresSessionFactory {
    source: PostgresEndpoint,
    destination: PostgresEndpoint,
    connect_retries: u32,
}

impl PostgresSessionFactory {
    pub fn new(
        source: PostgresEndpoint,
        destination: PostgresEndpoint,
        connect_retries: u32,
    ) -> Self {
        Self {
            source,
            destination,
            connect_retries,
        }
    }
}

#[async_trait]
impl SessionFactory for PostgresSessionFactory {
    type Source = PostgresSource;
    type Destination = PostgresDestination;

    async fn open_source(&self, database: &str) -> Result<PostgresSource> {
        tracing::info!("Connecting to source database: {}", database);
        let client = connect_with_retry(&self.source, database, self.connect_retries).await?;
        Ok(PostgresSource::new(client, database))
    }

    async fn open_destination(&self, database: &str) -> Result<PostgresDestination> {
        tracing::info!("Connecting to destination database: {}", database);
        let client =
            connect_with_retry(&self.destination, database, self.connect_retries).await?;
        Ok(PostgresDestination::new(client, database))
    }
}
