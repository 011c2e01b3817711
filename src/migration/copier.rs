// ABOUTME: Copies the rows of one table from the source to the destination
// ABOUTME: Streams rows in batches as INSERT statements that bind values to columns by name

use serde::Serialize;
use std::time::Instant;

use super::session::{DestinationSession, SourceSession};
use crate::error::{MigrateError, Result};
use crate::utils::{qualified_table, quote_ident, quote_literal};

/// Rows per INSERT statement unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Outcome of one successful table copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub rows: u64,
    pub elapsed_ms: u64,
}

/// Build one multi-row INSERT for `rows`
///
/// Values are text literals the server coerces to each column's type; the
/// explicit column list keeps the value-to-column association by name even
/// when the destination declares its columns in a different order.
pub fn build_insert_statement(
    schema: &str,
    table: &str,
    columns: &[String],
    rows: &[Vec<Option<String>>],
) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let values = rows
        .iter()
        .map(|row| {
            let literals = row
                .iter()
                .map(|value| match value {
                    Some(v) => quote_literal(v),
                    None => "NULL".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", literals)
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "INSERT INTO {} ({}) VALUES\n{}",
        qualified_table(schema, table),
        column_list,
        values
    )
}

/// Build the SELECT that reads every column of a table in text form
pub fn build_select_statement(schema: &str, table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {} FROM {}",
        column_list,
        qualified_table(schema, table)
    )
}

/// Copy every row of `table` from `source` to `destination`
///
/// Rows are pulled and inserted `batch_size` at a time, so only one batch is
/// held in memory. The destination commits once, after the last batch; a
/// failed batch rolls the table back and is reported with its first row offset.
pub async fn copy_table<S, D>(
    source: &mut S,
    destination: &mut D,
    schema: &str,
    table: &str,
    batch_size: usize,
) -> Result<TableReport>
where
    S: SourceSession + ?Sized,
    D: DestinationSession + ?Sized,
{
    tracing::info!("Starting data transfer for table '{}'...", table);
    let started = Instant::now();

    let columns = source.open_table(schema, table).await?;
    tracing::debug!("Reading {} columns from '{}'", columns.len(), table);

    let copied = if columns.is_empty() {
        tracing::warn!("Table '{}' has no columns, nothing to copy", table);
        Ok(0)
    } else {
        stream_rows(source, destination, schema, table, &columns, batch_size.max(1)).await
    };

    if let Err(e) = source.close_table().await {
        tracing::warn!("Failed to close read of '{}': {}", table, e);
    }
    let rows = copied?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        "✓ Transferred {} rows from table '{}' in {} ms",
        rows,
        table,
        elapsed_ms
    );

    Ok(TableReport {
        table: table.to_string(),
        rows,
        elapsed_ms,
    })
}

async fn stream_rows<S, D>(
    source: &mut S,
    destination: &mut D,
    schema: &str,
    table: &str,
    columns: &[String],
    batch_size: usize,
) -> Result<u64>
where
    S: SourceSession + ?Sized,
    D: DestinationSession + ?Sized,
{
    destination
        .begin_table(table)
        .await
        .map_err(|e| table_failure(table, None, e))?;

    let mut offset: u64 = 0;
    loop {
        let rows = match source.fetch_rows(batch_size).await {
            Ok(rows) => rows,
            Err(e) => {
                abandon(destination, table).await;
                return Err(e);
            }
        };
        if rows.is_empty() {
            break;
        }

        if let Err(e) = destination.insert_rows(schema, table, columns, &rows).await {
            abandon(destination, table).await;
            return Err(table_failure(table, Some(offset), e));
        }
        tracing::debug!(
            "Inserted {} rows (from offset {}) into '{}'",
            rows.len(),
            offset,
            table
        );
        offset += rows.len() as u64;
    }

    destination
        .commit_table(table)
        .await
        .map_err(|e| table_failure(table, None, e))?;
    Ok(offset)
}

async fn abandon<D: DestinationSession + ?Sized>(destination: &mut D, table: &str) {
    if let Err(e) = destination.rollback_table(table).await {
        tracing::warn!("Failed to roll back '{}': {}", table, e);
    }
}

/// Destination errors while a table is open only fail that table
fn table_failure(table: &str, row_offset: Option<u64>, err: MigrateError) -> MigrateError {
    match err {
        MigrateError::PartialTransfer { .. } => err,
        MigrateError::Query { message, .. } => {
            MigrateError::partial_transfer(table, row_offset, message)
        }
        other => MigrateError::partial_transfer(table, row_offset, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::planner::DependencyEdge;
    use crate::migration::session::{ReplicationRole, TextRow};
    use async_trait::async_trait;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_insert_statement_names_columns() {
        let sql = build_insert_statement(
            "public",
            "users",
            &cols(&["id", "name"]),
            &[row(&[Some("1"), Some("Alice")]), row(&[Some("2"), None])],
        );

        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"users\" (\"id\", \"name\") VALUES\n('1', 'Alice'),\n('2', NULL)"
        );
    }

    #[test]
    fn test_insert_statement_escapes_values() {
        let sql = build_insert_statement(
            "public",
            "notes",
            &cols(&["body"]),
            &[row(&[Some("O'Brien said \\n")])],
        );
        assert!(sql.ends_with("(E'O''Brien said \\\\n')"));
    }

    #[test]
    fn test_select_statement() {
        let sql = build_select_statement("public", "Order Items", &cols(&["id", "qty"]));
        assert_eq!(
            sql,
            "SELECT \"id\", \"qty\" FROM \"public\".\"Order Items\""
        );
    }

    #[derive(Default)]
    struct ListSource {
        rows: Vec<TextRow>,
        fetch_sizes: Vec<usize>,
        fail_fetch: bool,
        closed: bool,
    }

    #[async_trait]
    impl SourceSession for ListSource {
        async fn list_databases(&mut self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn list_tables(&mut self, _schema: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn list_foreign_key_edges(&mut self, _schema: &str) -> Result<Vec<DependencyEdge>> {
            Ok(Vec::new())
        }

        async fn open_table(&mut self, _schema: &str, _table: &str) -> Result<Vec<String>> {
            Ok(cols(&["id"]))
        }

        async fn fetch_rows(&mut self, max_rows: usize) -> Result<Vec<TextRow>> {
            if self.fail_fetch {
                return Err(MigrateError::query("fetch", "canceling statement"));
            }
            self.fetch_sizes.push(max_rows);
            let take = max_rows.min(self.rows.len());
            Ok(self.rows.drain(..take).collect())
        }

        async fn close_table(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct BatchLog {
        /// Batch sizes as inserted
        batches: Vec<usize>,
        fail_on_batch: Option<usize>,
        committed: bool,
        rolled_back: bool,
    }

    #[async_trait]
    impl DestinationSession for BatchLog {
        async fn set_replication_role(&mut self, _role: ReplicationRole) -> Result<()> {
            Ok(())
        }

        async fn begin_table(&mut self, _table: &str) -> Result<()> {
            Ok(())
        }

        async fn insert_rows(
            &mut self,
            _schema: &str,
            table: &str,
            _columns: &[String],
            rows: &[TextRow],
        ) -> Result<()> {
            if self.fail_on_batch == Some(self.batches.len()) {
                return Err(MigrateError::query(
                    format!("insert into '{}'", table),
                    "value too long for type character varying(3)",
                ));
            }
            self.batches.push(rows.len());
            Ok(())
        }

        async fn commit_table(&mut self, _table: &str) -> Result<()> {
            self.committed = true;
            Ok(())
        }

        async fn rollback_table(&mut self, _table: &str) -> Result<()> {
            self.rolled_back = true;
            Ok(())
        }
    }

    fn numbered(n: usize) -> Vec<TextRow> {
        (0..n).map(|i| vec![Some(i.to_string())]).collect()
    }

    #[tokio::test]
    async fn test_rows_stream_in_batches() {
        let mut source = ListSource {
            rows: numbered(5),
            ..Default::default()
        };
        let mut dest = BatchLog::default();

        let report = copy_table(&mut source, &mut dest, "public", "t", 2)
            .await
            .unwrap();

        assert_eq!(report.rows, 5);
        assert_eq!(dest.batches, vec![2, 2, 1]);
        assert_eq!(source.fetch_sizes, vec![2, 2, 2, 2]);
        assert!(dest.committed);
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_failed_batch_reports_offset_and_rolls_back() {
        let mut source = ListSource {
            rows: numbered(5),
            ..Default::default()
        };
        let mut dest = BatchLog {
            fail_on_batch: Some(1),
            ..Default::default()
        };

        let err = copy_table(&mut source, &mut dest, "public", "t", 2)
            .await
            .unwrap_err();

        match err {
            MigrateError::PartialTransfer {
                table,
                row_offset,
                message,
            } => {
                assert_eq!(table, "t");
                assert_eq!(row_offset, Some(2));
                assert!(message.contains("character varying(3)"));
            }
            other => panic!("expected PartialTransfer, got {:?}", other),
        }
        assert!(dest.rolled_back);
        assert!(!dest.committed);
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_read_failure_is_not_table_scoped() {
        let mut source = ListSource {
            rows: numbered(3),
            fail_fetch: true,
            ..Default::default()
        };
        let mut dest = BatchLog::default();

        let err = copy_table(&mut source, &mut dest, "public", "t", 2)
            .await
            .unwrap_err();

        assert!(!err.is_table_scoped());
        assert!(dest.rolled_back);
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_empty_table_commits_nothing() {
        let mut source = ListSource::default();
        let mut dest = BatchLog::default();

        let report = copy_table(&mut source, &mut dest, "public", "t", 0)
            .await
            .unwrap();

        assert_eq!(report.rows, 0);
        assert!(dest.batches.is_empty());
        // Zero batch size is clamped to one row per fetch
        assert_eq!(source.fetch_sizes, vec![1]);
        assert!(dest.committed);
    }
}
