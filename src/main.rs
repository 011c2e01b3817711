// ABOUTME: CLI entry point for db-migrator
// ABOUTME: Parses commands and routes to the postgres or redis pipeline

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use db_migrator::commands;
use db_migrator::config::{
    self, FileConfig, PostgresEndpoint, PostgresMigrationConfig, PostgresOverrides, RedisEndpoint,
    RedisMigrationConfig, RedisOverrides,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "db-migrator")]
#[command(about = "Copy PostgreSQL databases or Redis keys between servers", long_about = None)]
struct Cli {
    /// TOML file with default settings for both pipelines
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write the run summary as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every database from the source PostgreSQL server to the destination
    Postgres(PostgresArgs),
    /// Copy keys, values, and TTLs from the source Redis to the destination
    Redis(RedisArgs),
}

#[derive(Args)]
struct PostgresArgs {
    #[arg(long, env = "HOST_SOURCE")]
    source_host: String,
    #[arg(long, env = "PORT_SOURCE", default_value_t = 5432)]
    source_port: u16,
    #[arg(long, env = "USER_SOURCE")]
    source_user: String,
    #[arg(long, env = "PASSWORD_SOURCE", default_value = "", hide_env_values = true)]
    source_password: String,
    #[arg(long, env = "HOST_DEST")]
    dest_host: String,
    #[arg(long, env = "PORT_DEST", default_value_t = 5432)]
    dest_port: u16,
    #[arg(long, env = "USER_DEST")]
    dest_user: String,
    #[arg(long, env = "PASSWORD_DEST", default_value = "", hide_env_values = true)]
    dest_password: String,
    /// Include only these databases (comma-separated)
    #[arg(long, value_delimiter = ',')]
    include_databases: Option<Vec<String>>,
    /// Exclude these databases (comma-separated); postgres is always excluded
    #[arg(long, env = "EXCLUDED_DATABASES", value_delimiter = ',')]
    exclude_databases: Option<Vec<String>>,
    /// Exclude these tables (format: database.table, comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_tables: Option<Vec<String>>,
    /// Schema to copy in every database [default: public]
    #[arg(long)]
    schema: Option<String>,
    /// Rows per INSERT statement [default: 1000]
    #[arg(long)]
    batch_size: Option<usize>,
    /// Do not copy tables caught in foreign-key cycles
    #[arg(long)]
    skip_unordered: bool,
    /// Plan and log the transfer order without writing anything
    #[arg(long)]
    dry_run: bool,
    /// Connection retries with exponential backoff [default: 2]
    #[arg(long)]
    connect_retries: Option<u32>,
}

impl PostgresArgs {
    fn into_config(self, file: &FileConfig) -> anyhow::Result<PostgresMigrationConfig> {
        let source = PostgresEndpoint {
            host: self.source_host,
            port: self.source_port,
            user: self.source_user,
            password: self.source_password,
        };
        let destination = PostgresEndpoint {
            host: self.dest_host,
            port: self.dest_port,
            user: self.dest_user,
            password: self.dest_password,
        };
        let overrides = PostgresOverrides {
            include_databases: self.include_databases,
            exclude_databases: self.exclude_databases,
            exclude_tables: self.exclude_tables,
            schema: self.schema,
            batch_size: self.batch_size,
            skip_unordered: self.skip_unordered,
            dry_run: self.dry_run,
            connect_retries: self.connect_retries,
        };
        Ok(PostgresMigrationConfig::resolve(
            source,
            destination,
            overrides,
            file.postgres.clone(),
        )?)
    }
}

#[derive(Args)]
struct RedisArgs {
    #[arg(long, env = "HOST_SOURCE")]
    source_host: String,
    #[arg(long, env = "PORT_SOURCE", default_value_t = 6379)]
    source_port: u16,
    #[arg(long, env = "PASSWORD_SOURCE", hide_env_values = true)]
    source_password: Option<String>,
    #[arg(long, env = "HOST_DEST")]
    dest_host: String,
    #[arg(long, env = "PORT_DEST", default_value_t = 6379)]
    dest_port: u16,
    #[arg(long, env = "PASSWORD_DEST", hide_env_values = true)]
    dest_password: Option<String>,
    /// Logical database on both servers
    #[arg(long, env = "DB", default_value_t = 0)]
    db: i64,
    /// Only copy keys matching this glob [default: *]
    #[arg(long)]
    pattern: Option<String>,
    /// COUNT hint for SCAN [default: 500]
    #[arg(long)]
    scan_count: Option<usize>,
    /// Connection retries with exponential backoff [default: 2]
    #[arg(long)]
    connect_retries: Option<u32>,
}

impl RedisArgs {
    fn into_config(self, file: &FileConfig) -> anyhow::Result<RedisMigrationConfig> {
        let source = RedisEndpoint {
            host: self.source_host,
            port: self.source_port,
            password: self.source_password.filter(|p| !p.is_empty()),
            db: self.db,
        };
        let destination = RedisEndpoint {
            host: self.dest_host,
            port: self.dest_port,
            password: self.dest_password.filter(|p| !p.is_empty()),
            db: self.db,
        };
        let overrides = RedisOverrides {
            pattern: self.pattern,
            scan_count: self.scan_count,
            connect_retries: self.connect_retries,
        };
        Ok(RedisMigrationConfig::resolve(
            source,
            destination,
            overrides,
            file.redis.clone(),
        )?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply
    dotenvy::dotenv().ok();

    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => config::load_config_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => FileConfig::default(),
    };
    let report = cli.report.as_deref();

    match cli.command {
        Commands::Postgres(args) => {
            let config = args.into_config(&file_config)?;
            commands::postgres(config, report).await
        }
        Commands::Redis(args) => {
            let config = args.into_config(&file_config)?;
            commands::redis(config, report).await
        }
    }
}
