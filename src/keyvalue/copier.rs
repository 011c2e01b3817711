// ABOUTME: Sequential per-key copy loop between a key source and a key sink
// ABOUTME: Records missing, unsupported, and failed keys without stopping the run

use serde::Serialize;
use std::time::Instant;

use super::{KeySink, KeySource, ReadOutcome};
use crate::config::KeyCopyOptions;
use crate::error::{MigrateError, Result};

/// A key that could not be copied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    /// Key name, lossily decoded for display
    pub key: String,
    pub error: String,
}

/// Outcome of one key-value migration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyCopySummary {
    pub scanned: u64,
    pub copied: u64,
    /// Keys that vanished between SCAN and read
    pub missing: u64,
    pub unsupported: u64,
    pub failed: Vec<KeyFailure>,
    pub elapsed_ms: u64,
}

impl KeyCopySummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn log(&self) {
        if self.is_success() {
            tracing::info!(
                "✓ Copied {}/{} keys in {}ms ({} missing, {} unsupported)",
                self.copied,
                self.scanned,
                self.elapsed_ms,
                self.missing,
                self.unsupported
            );
        } else {
            tracing::error!(
                "✗ Copied {}/{} keys, {} failed",
                self.copied,
                self.scanned,
                self.failed.len()
            );
            for failure in &self.failed {
                tracing::error!("    {}: {}", failure.key, failure.error);
            }
        }
    }
}

enum KeyOutcome {
    Copied,
    Missing,
    Unsupported(String),
}

/// Copy every key matching the configured pattern from `source` to `sink`
///
/// Keys are copied one at a time. A key that fails is recorded and the loop
/// moves on; only enumeration failures and lost connections abort the run.
pub async fn migrate_keys<S, K>(
    source: &mut S,
    sink: &mut K,
    options: &KeyCopyOptions,
) -> Result<KeyCopySummary>
where
    S: KeySource + ?Sized,
    K: KeySink + ?Sized,
{
    let start = Instant::now();
    let mut summary = KeyCopySummary::default();

    let keys = source.scan_keys(&options.pattern, options.scan_count).await?;
    summary.scanned = keys.len() as u64;

    if keys.is_empty() {
        tracing::info!("No keys found in the source matching '{}'", options.pattern);
        return Ok(summary);
    }
    tracing::info!("Found {} keys in the source. Migrating data...", keys.len());

    for (index, key) in keys.iter().enumerate() {
        match copy_key(source, sink, key).await {
            Ok(KeyOutcome::Copied) => summary.copied += 1,
            Ok(KeyOutcome::Missing) => {
                tracing::debug!("Key '{}' disappeared before it was read", display_key(key));
                summary.missing += 1;
            }
            Ok(KeyOutcome::Unsupported(kind)) => {
                tracing::warn!(
                    "Skipping key '{}': unsupported type '{}'",
                    display_key(key),
                    kind
                );
                summary.unsupported += 1;
            }
            Err(e @ MigrateError::Connectivity { .. }) => return Err(e),
            Err(e) => {
                tracing::error!("Failed to copy key '{}': {}", display_key(key), e);
                summary.failed.push(KeyFailure {
                    key: display_key(key),
                    error: e.to_string(),
                });
            }
        }

        if (index + 1) % 10_000 == 0 {
            tracing::info!("  {}/{} keys processed", index + 1, keys.len());
        }
    }

    summary.elapsed_ms = start.elapsed().as_millis() as u64;
    Ok(summary)
}

async fn copy_key<S, K>(source: &mut S, sink: &mut K, key: &[u8]) -> Result<KeyOutcome>
where
    S: KeySource + ?Sized,
    K: KeySink + ?Sized,
{
    match source.read_entry(key).await? {
        ReadOutcome::Entry(entry) => {
            sink.write_entry(&entry).await?;
            Ok(KeyOutcome::Copied)
        }
        ReadOutcome::Missing => Ok(KeyOutcome::Missing),
        ReadOutcome::Unsupported(kind) => Ok(KeyOutcome::Unsupported(kind)),
    }
}

fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
