// ABOUTME: Drives the relational migration database by database
// ABOUTME: Plans the copy order, brackets the copy with the constraint gate, and aggregates results

use serde::Serialize;

use super::copier::{copy_table, TableReport};
use super::gate::{settle, ConstraintGate};
use super::planner::{plan_transfer_order, TransferPlan};
use super::session::{DestinationSession, SessionFactory, SourceSession};
use crate::config::TransferOptions;
use crate::error::{MigrateError, Result};
use crate::filters::{DatabaseFilter, ADMIN_DATABASE};

/// A table whose copy failed while the rest of its database went on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// What happened to one database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseReport {
    pub database: String,
    /// Copy order computed for the database
    pub transfer_order: Vec<String>,
    /// Tables copied, in copy order
    pub tables: Vec<TableReport>,
    pub failed_tables: Vec<TableFailure>,
    /// Tables the planner could not order because of foreign-key cycles
    pub unordered_tables: Vec<String>,
    /// The unordered tables that form the cycles themselves
    pub cyclic_tables: Vec<String>,
    /// Error that stopped the database, if any
    pub error: Option<String>,
}

impl DatabaseReport {
    fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed_tables.is_empty()
    }

    pub fn rows_copied(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Aggregated outcome of a multi-database run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub databases: Vec<DatabaseReport>,
}

impl MigrationSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &DatabaseReport> {
        self.databases.iter().filter(|db| db.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DatabaseReport> {
        self.databases.iter().filter(|db| !db.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.databases.iter().all(DatabaseReport::is_success)
    }

    pub fn rows_copied(&self) -> u64 {
        self.databases.iter().map(DatabaseReport::rows_copied).sum()
    }

    /// Log one line per database plus totals
    pub fn log(&self) {
        for db in &self.databases {
            if db.is_success() {
                tracing::info!(
                    "✓ {}: {} tables, {} rows",
                    db.database,
                    db.tables.len(),
                    db.rows_copied()
                );
            } else {
                let reason = db.error.clone().unwrap_or_else(|| {
                    format!("{} table(s) failed", db.failed_tables.len())
                });
                tracing::error!("✗ {}: {}", db.database, reason);
                for failure in &db.failed_tables {
                    tracing::error!("    {}: {}", failure.table, failure.error);
                }
            }
        }
        tracing::info!(
            "Migrated {}/{} databases, {} rows in total",
            self.succeeded().count(),
            self.databases.len(),
            self.rows_copied()
        );
    }
}

/// Migrate every database the filter selects
///
/// Databases are listed on the administrative database of the source. Each
/// database is attempted in isolation: its failure is recorded in the summary
/// and the next database is still migrated. Only a failure to list databases
/// is returned as an error.
pub async fn migrate_databases<F>(
    factory: &F,
    options: &TransferOptions,
    filter: &DatabaseFilter,
) -> Result<MigrationSummary>
where
    F: SessionFactory,
{
    let all_databases = {
        let mut admin = factory.open_source(ADMIN_DATABASE).await?;
        admin.list_databases().await?
    };
    tracing::info!("Found databases in source: {:?}", all_databases);

    let databases = filter.select_databases(all_databases);
    if databases.is_empty() {
        tracing::warn!(
            "No databases selected for migration (excluded: {:?})",
            filter.excluded_databases()
        );
    }

    let mut summary = MigrationSummary::default();
    for database in &databases {
        tracing::info!("Transferring database: {}", database);
        let report = migrate_database(factory, database, options, filter).await;
        summary.databases.push(report);
    }

    Ok(summary)
}

/// Migrate one database, never failing: errors end up in the report
pub async fn migrate_database<F>(
    factory: &F,
    database: &str,
    options: &TransferOptions,
    filter: &DatabaseFilter,
) -> DatabaseReport
where
    F: SessionFactory,
{
    let mut report = DatabaseReport::new(database);

    match run_database(factory, database, options, filter, &mut report).await {
        Ok(()) if report.is_success() => {
            tracing::info!(
                "✓ Database '{}' complete: {} tables, {} rows",
                database,
                report.tables.len(),
                report.rows_copied()
            );
        }
        Ok(()) => {
            tracing::error!(
                "Database '{}' finished with {} failed table(s)",
                database,
                report.failed_tables.len()
            );
        }
        Err(e) => {
            tracing::error!("Database '{}' failed: {}", database, e);
            report.error = Some(e.to_string());
        }
    }

    report
}

async fn run_database<F>(
    factory: &F,
    database: &str,
    options: &TransferOptions,
    filter: &DatabaseFilter,
    report: &mut DatabaseReport,
) -> Result<()>
where
    F: SessionFactory,
{
    let mut source = factory.open_source(database).await?;

    let tables = filter.select_tables(database, source.list_tables(&options.schema).await?);
    tracing::info!("Found tables in database '{}': {:?}", database, tables);

    let edges = source.list_foreign_key_edges(&options.schema).await?;
    let plan = plan_transfer_order(&tables, &edges);
    record_plan(database, &plan, report);

    let sequence = plan.copy_sequence(options.copy_unordered);
    tracing::info!("Transfer order for tables: {:?}", sequence);

    if options.dry_run {
        tracing::info!("Dry run: skipping data transfer for '{}'", database);
        return ordering_outcome(database, &plan, options);
    }

    let mut destination = factory.open_destination(database).await?;

    let mut gate = ConstraintGate::engage(&mut destination).await?;
    let copied = copy_tables(
        &mut source,
        gate.destination(),
        &sequence,
        options,
        report,
    )
    .await;
    let released = gate.release().await;
    settle(copied, released)?;

    ordering_outcome(database, &plan, options)
}

fn record_plan(database: &str, plan: &TransferPlan, report: &mut DatabaseReport) {
    report.transfer_order = plan.order().to_vec();
    if plan.is_complete() {
        return;
    }

    report.unordered_tables = plan.unordered().to_vec();
    report.cyclic_tables = plan.cyclic().to_vec();
    tracing::warn!(
        "Foreign key cycle in database '{}' between {:?}",
        database,
        plan.cyclic()
    );
    let blocked: Vec<&String> = plan.blocked().collect();
    if !blocked.is_empty() {
        tracing::warn!("Tables blocked behind the cycle: {:?}", blocked);
    }
}

fn ordering_outcome(database: &str, plan: &TransferPlan, options: &TransferOptions) -> Result<()> {
    if plan.is_complete() || options.copy_unordered {
        return Ok(());
    }
    Err(MigrateError::OrderingIncomplete {
        database: database.to_string(),
        tables: plan.unordered().to_vec(),
    })
}

/// Copy `sequence` in order; table-scoped failures are recorded and skipped
async fn copy_tables<S, D>(
    source: &mut S,
    destination: &mut D,
    sequence: &[&str],
    options: &TransferOptions,
    report: &mut DatabaseReport,
) -> Result<()>
where
    S: SourceSession,
    D: DestinationSession,
{
    for table in sequence {
        match copy_table(
            source,
            destination,
            &options.schema,
            table,
            options.batch_size,
        )
        .await
        {
            Ok(table_report) => report.tables.push(table_report),
            Err(e) if e.is_table_scoped() => {
                tracing::error!(
                    "Table '{}' in '{}' failed: {}",
                    table,
                    report.database,
                    e
                );
                report.failed_tables.push(TableFailure {
                    table: table.to_string(),
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
