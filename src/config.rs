// ABOUTME: Run configuration built once at startup and passed to the pipelines
// ABOUTME: Merges CLI/environment values with optional TOML file defaults

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{MigrateError, Result};
use crate::filters::DatabaseFilter;
use crate::migration::copier::DEFAULT_BATCH_SIZE;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_CONNECT_RETRIES: u32 = 2;
pub const DEFAULT_KEY_PATTERN: &str = "*";
pub const DEFAULT_SCAN_COUNT: usize = 500;

/// Where to reach one PostgreSQL server
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for PostgresEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Display for PostgresEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

impl PostgresEndpoint {
    fn validate(&self, role: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MigrateError::Config(format!("{} host cannot be empty", role)));
        }
        if self.port == 0 {
            return Err(MigrateError::Config(format!("{} port cannot be 0", role)));
        }
        if self.user.trim().is_empty() {
            return Err(MigrateError::Config(format!("{} user cannot be empty", role)));
        }
        Ok(())
    }
}

/// Where to reach one Redis server and which logical database to use
#[derive(Clone, PartialEq, Eq)]
pub struct RedisEndpoint {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl fmt::Debug for RedisEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .finish()
    }
}

impl fmt::Display for RedisEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.db)
    }
}

impl RedisEndpoint {
    fn validate(&self, role: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MigrateError::Config(format!("{} host cannot be empty", role)));
        }
        if self.port == 0 {
            return Err(MigrateError::Config(format!("{} port cannot be 0", role)));
        }
        if self.db < 0 {
            return Err(MigrateError::Config(format!(
                "{} logical database must be >= 0, got {}",
                role, self.db
            )));
        }
        Ok(())
    }
}

/// How tables are copied inside each database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub schema: String,
    pub batch_size: usize,
    /// Copy tables caught in foreign-key cycles after the ordered ones
    pub copy_unordered: bool,
    /// Plan and log the transfer order without writing anything
    pub dry_run: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            copy_unordered: true,
            dry_run: false,
        }
    }
}

/// Everything the relational pipeline needs
#[derive(Debug, Clone)]
pub struct PostgresMigrationConfig {
    pub source: PostgresEndpoint,
    pub destination: PostgresEndpoint,
    pub filter: DatabaseFilter,
    pub transfer: TransferOptions,
    pub connect_retries: u32,
}

/// Values given on the command line or through the environment.
///
/// `None` falls back to the config file, then to the built-in default.
#[derive(Debug, Clone, Default)]
pub struct PostgresOverrides {
    pub include_databases: Option<Vec<String>>,
    pub exclude_databases: Option<Vec<String>>,
    pub exclude_tables: Option<Vec<String>>,
    pub schema: Option<String>,
    pub batch_size: Option<usize>,
    pub skip_unordered: bool,
    pub dry_run: bool,
    pub connect_retries: Option<u32>,
}

impl PostgresMigrationConfig {
    pub fn resolve(
        source: PostgresEndpoint,
        destination: PostgresEndpoint,
        overrides: PostgresOverrides,
        file: PostgresFileConfig,
    ) -> Result<Self> {
        source.validate("Source")?;
        destination.validate("Destination")?;

        let filter = DatabaseFilter::new(
            overrides.include_databases.or(file.include_databases),
            overrides.exclude_databases.or(file.exclude_databases),
            overrides.exclude_tables.or(file.exclude_tables),
        )?;

        let batch_size = overrides
            .batch_size
            .or(file.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(MigrateError::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        let schema = overrides
            .schema
            .or(file.schema)
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        if schema.trim().is_empty() {
            return Err(MigrateError::Config("Schema cannot be empty".to_string()));
        }

        let copy_unordered = !overrides.skip_unordered && file.copy_unordered.unwrap_or(true);

        Ok(Self {
            source,
            destination,
            filter,
            transfer: TransferOptions {
                schema,
                batch_size,
                copy_unordered,
                dry_run: overrides.dry_run,
            },
            connect_retries: overrides
                .connect_retries
                .or(file.connect_retries)
                .unwrap_or(DEFAULT_CONNECT_RETRIES),
        })
    }
}

/// How keys are enumerated on the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCopyOptions {
    pub pattern: String,
    /// COUNT hint passed to SCAN
    pub scan_count: usize,
}

impl Default for KeyCopyOptions {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_KEY_PATTERN.to_string(),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

/// Everything the key-value pipeline needs
#[derive(Debug, Clone)]
pub struct RedisMigrationConfig {
    pub source: RedisEndpoint,
    pub destination: RedisEndpoint,
    pub keys: KeyCopyOptions,
    pub connect_retries: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RedisOverrides {
    pub pattern: Option<String>,
    pub scan_count: Option<usize>,
    pub connect_retries: Option<u32>,
}

impl RedisMigrationConfig {
    pub fn resolve(
        source: RedisEndpoint,
        destination: RedisEndpoint,
        overrides: RedisOverrides,
        file: RedisFileConfig,
    ) -> Result<Self> {
        source.validate("Source")?;
        destination.validate("Destination")?;

        let pattern = overrides
            .pattern
            .or(file.pattern)
            .unwrap_or_else(|| DEFAULT_KEY_PATTERN.to_string());
        if pattern.is_empty() {
            return Err(MigrateError::Config("Key pattern cannot be empty".to_string()));
        }

        let scan_count = overrides
            .scan_count
            .or(file.scan_count)
            .unwrap_or(DEFAULT_SCAN_COUNT);
        if scan_count == 0 {
            return Err(MigrateError::Config(
                "Scan count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source,
            destination,
            keys: KeyCopyOptions {
                pattern,
                scan_count,
            },
            connect_retries: overrides
                .connect_retries
                .or(file.connect_retries)
                .unwrap_or(DEFAULT_CONNECT_RETRIES),
        })
    }
}

/// Optional TOML file with defaults for both pipelines
///
/// ```toml
/// [postgres]
/// exclude_databases = ["legacy"]
/// exclude_tables = ["shop.audit_log"]
/// batch_size = 500
///
/// [redis]
/// pattern = "session:*"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub postgres: PostgresFileConfig,
    #[serde(default)]
    pub redis: RedisFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresFileConfig {
    pub schema: Option<String>,
    pub batch_size: Option<usize>,
    pub include_databases: Option<Vec<String>>,
    pub exclude_databases: Option<Vec<String>>,
    pub exclude_tables: Option<Vec<String>>,
    pub copy_unordered: Option<bool>,
    pub connect_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisFileConfig {
    pub pattern: Option<String>,
    pub scan_count: Option<usize>,
    pub connect_retries: Option<u32>,
}

pub fn load_config_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)?;
    let parsed: FileConfig = toml::from_str(&raw)?;
    Ok(parsed)
}
