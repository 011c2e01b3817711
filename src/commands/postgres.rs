// ABOUTME: Postgres command - copies every selected database to the destination server
// ABOUTME: Runs the orchestrator, logs the summary, and optionally writes a JSON report

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::PostgresMigrationConfig;
use crate::migration;
use crate::postgres::PostgresSessionFactory;
use crate::report;

/// Migrate all selected databases from the source to the destination server
///
/// Every database is attempted even if an earlier one fails. The command
/// returns an error when at least one database or table failed, after the
/// full summary has been logged and written.
pub async fn postgres(config: PostgresMigrationConfig, report_path: Option<&Path>) -> Result<()> {
    tracing::info!("Starting PostgreSQL migration...");
    tracing::info!("Source: {}", config.source);
    tracing::info!("Destination: {}", config.destination);
    if config.transfer.dry_run {
        tracing::info!("Dry run: no data will be written");
    }

    let factory = PostgresSessionFactory::new(
        config.source.clone(),
        config.destination.clone(),
        config.connect_retries,
    );

    let summary = migration::migrate_databases(&factory, &config.transfer, &config.filter)
        .await
        .context("Failed to list databases on the source server")?;

    summary.log();

    if let Some(path) = report_path {
        report::write_json_report(path, &summary)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if !summary.is_success() {
        let failed: Vec<&str> = summary.failed().map(|db| db.database.as_str()).collect();
        bail!(
            "Migration finished with errors in {} database(s): {}",
            failed.len(),
            failed.join(", ")
        );
    }

    tracing::info!("✓ PostgreSQL migration complete");
    Ok(())
}
