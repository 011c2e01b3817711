// ABOUTME: Catalog queries that discover databases, tables, and foreign keys
// ABOUTME: Feeds the transfer order planner with the tables and edges of a database

use tokio_postgres::Client;

use super::planner::DependencyEdge;
use crate::error::{MigrateError, Result};

const LIST_DATABASES_SQL: &str = "SELECT datname
     FROM pg_catalog.pg_database
     WHERE datistemplate = false
     ORDER BY datname";

// Ordinary and partitioned tables; partitions are filled through their parent.
const LIST_TABLES_SQL: &str = "SELECT c.relname
     FROM pg_catalog.pg_class c
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
     WHERE n.nspname = $1
       AND c.relkind IN ('r', 'p')
       AND NOT c.relispartition
     ORDER BY c.relname";

// One row per constraint, so composite keys collapse to a single edge.
const LIST_FOREIGN_KEYS_SQL: &str = "SELECT child.relname AS child_table,
            parent.relname AS parent_table
     FROM pg_catalog.pg_constraint con
     JOIN pg_catalog.pg_class child ON child.oid = con.conrelid
     JOIN pg_catalog.pg_namespace child_ns ON child_ns.oid = child.relnamespace
     JOIN pg_catalog.pg_class parent ON parent.oid = con.confrelid
     JOIN pg_catalog.pg_namespace parent_ns ON parent_ns.oid = parent.relnamespace
     WHERE con.contype = 'f'
       AND child_ns.nspname = $1
       AND parent_ns.nspname = $1
     ORDER BY child.relname, con.conname";

/// List all non-template databases on the server
///
/// The administrative and excluded databases are filtered later by
/// [`crate::filters::DatabaseFilter`].
pub async fn list_databases(client: &Client) -> Result<Vec<String>> {
    let rows = client
        .query(LIST_DATABASES_SQL, &[])
        .await
        .map_err(|e| MigrateError::query("list databases", e))?;

    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// List the base tables of `schema` in the connected database
pub async fn list_tables(client: &Client, schema: &str) -> Result<Vec<String>> {
    let rows = client
        .query(LIST_TABLES_SQL, &[&schema])
        .await
        .map_err(|e| MigrateError::query(format!("list tables in schema '{}'", schema), e))?;

    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// List foreign keys of `schema` as (child, parent) table pairs
///
/// Keys that reference a table in another schema are left out: they cannot
/// influence the copy order inside `schema`.
pub async fn list_foreign_key_edges(client: &Client, schema: &str) -> Result<Vec<DependencyEdge>> {
    let rows = client
        .query(LIST_FOREIGN_KEYS_SQL, &[&schema])
        .await
        .map_err(|e| {
            MigrateError::query(format!("list foreign keys in schema '{}'", schema), e)
        })?;

    Ok(rows
        .iter()
        .map(|row| DependencyEdge::new(row.get::<_, String>(0), row.get::<_, String>(1)))
        .collect())
}
