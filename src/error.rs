// ABOUTME: Error kinds raised by the migration core
// ABOUTME: Distinguishes connection, query, partial transfer, and ordering failures

use thiserror::Error;

/// Error type shared by the relational and key-value pipelines.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// A connection to a server or database could not be opened
    #[error("Cannot connect to {target}: {message}")]
    Connectivity { target: String, message: String },

    /// A catalog query, SQL statement, or Redis command was rejected
    #[error("Query failed ({context}): {message}")]
    Query { context: String, message: String },

    /// A row batch insert failed; the table's transaction was rolled back
    #[error("{}", partial_transfer_message(.table, .row_offset, .message))]
    PartialTransfer {
        table: String,
        row_offset: Option<u64>,
        message: String,
    },

    /// Foreign-key cycles left tables out of the transfer order
    #[error("Could not order {} table(s) in database '{database}': {}", .tables.len(), .tables.join(", "))]
    OrderingIncomplete {
        database: String,
        tables: Vec<String>,
    },

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn partial_transfer_message(table: &str, row_offset: &Option<u64>, message: &str) -> String {
    match row_offset {
        Some(offset) => format!(
            "Transfer failed for table '{}' at row offset {}: {}",
            table, offset, message
        ),
        None => format!("Transfer failed for table '{}': {}", table, message),
    }
}

impl MigrateError {
    pub fn connectivity(target: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn query(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        MigrateError::Query {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn partial_transfer(
        table: impl Into<String>,
        row_offset: Option<u64>,
        err: impl std::fmt::Display,
    ) -> Self {
        MigrateError::PartialTransfer {
            table: table.into(),
            row_offset,
            message: err.to_string(),
        }
    }

    /// True for errors that only invalidate the current table, not the database
    pub fn is_table_scoped(&self) -> bool {
        matches!(self, MigrateError::PartialTransfer { .. })
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
