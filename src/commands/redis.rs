// ABOUTME: Redis command - copies every matching key with its TTL to the destination
// ABOUTME: Connects both stores, runs the key copier, and reports the outcome

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::RedisMigrationConfig;
use crate::keyvalue::{self, RedisStore};
use crate::report;

pub async fn redis(config: RedisMigrationConfig, report_path: Option<&Path>) -> Result<()> {
    tracing::info!("Starting Redis migration...");
    tracing::info!("Source: {}", config.source);
    tracing::info!("Destination: {}", config.destination);

    let mut source = RedisStore::connect_with_retry(&config.source, config.connect_retries)
        .await
        .context("Failed to connect to source Redis")?;
    let mut destination =
        RedisStore::connect_with_retry(&config.destination, config.connect_retries)
            .await
            .context("Failed to connect to destination Redis")?;

    let summary = keyvalue::migrate_keys(&mut source, &mut destination, &config.keys)
        .await
        .context("Redis migration aborted")?;

    summary.log();

    if let Some(path) = report_path {
        report::write_json_report(path, &summary)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if !summary.is_success() {
        bail!("{} key(s) failed to copy", summary.failed.len());
    }

    tracing::info!("✓ Redis migration complete");
    Ok(())
}
