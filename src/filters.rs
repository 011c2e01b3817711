// ABOUTME: Database and table selection rules for a migration run
// ABOUTME: Always excludes the administrative postgres database

use serde::Serialize;

use crate::error::{MigrateError, Result};
use crate::utils::clean_name_list;

/// Administrative database used for catalog discovery; never migrated
pub const ADMIN_DATABASE: &str = "postgres";

/// Decides which databases and tables a run migrates
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseFilter {
    include_databases: Option<Vec<String>>,
    exclude_databases: Vec<String>,
    exclude_tables: Vec<String>, // Format: "db.table"
}

impl Default for DatabaseFilter {
    fn default() -> Self {
        Self {
            include_databases: None,
            exclude_databases: vec![ADMIN_DATABASE.to_string()],
            exclude_tables: Vec::new(),
        }
    }
}

impl DatabaseFilter {
    /// Creates a filter from configured lists
    ///
    /// `postgres` is added to the exclusions whatever the caller passes.
    pub fn new(
        include_databases: Option<Vec<String>>,
        exclude_databases: Option<Vec<String>>,
        exclude_tables: Option<Vec<String>>,
    ) -> Result<Self> {
        let include_databases = include_databases.map(clean_name_list);
        if matches!(&include_databases, Some(list) if list.is_empty()) {
            return Err(MigrateError::Config(
                "--include-databases was given but names no database".to_string(),
            ));
        }

        let mut exclude_databases = clean_name_list(exclude_databases.unwrap_or_default());
        if !exclude_databases.iter().any(|db| db == ADMIN_DATABASE) {
            exclude_databases.push(ADMIN_DATABASE.to_string());
        }

        let exclude_tables = clean_name_list(exclude_tables.unwrap_or_default());
        for table in &exclude_tables {
            match table.split_once('.') {
                Some((db, name)) if !db.is_empty() && !name.is_empty() => {}
                _ => {
                    return Err(MigrateError::Config(format!(
                        "Table must be specified as 'database.table', got '{}'",
                        table
                    )))
                }
            }
        }

        Ok(Self {
            include_databases,
            exclude_databases,
            exclude_tables,
        })
    }

    pub fn excluded_databases(&self) -> &[String] {
        &self.exclude_databases
    }

    /// Determines if a database should be migrated
    pub fn should_migrate_database(&self, db_name: &str) -> bool {
        if let Some(ref include) = self.include_databases {
            if !include.iter().any(|db| db == db_name) {
                return false;
            }
        }

        !self.exclude_databases.iter().any(|db| db == db_name)
    }

    /// Determines if a table should be migrated
    pub fn should_migrate_table(&self, db_name: &str, table_name: &str) -> bool {
        !self.exclude_tables.iter().any(|entry| {
            entry
                .split_once('.')
                .is_some_and(|(db, table)| db == db_name && table == table_name)
        })
    }

    /// Keep the databases this filter selects, preserving order
    pub fn select_databases(&self, databases: Vec<String>) -> Vec<String> {
        databases
            .into_iter()
            .filter(|db| self.should_migrate_database(db))
            .collect()
    }

    /// Keep the tables of `db_name` this filter selects, preserving order
    pub fn select_tables(&self, db_name: &str, tables: Vec<String>) -> Vec<String> {
        tables
            .into_iter()
            .filter(|table| self.should_migrate_table(db_name, table))
            .collect()
    }
}
