// ABOUTME: PostgreSQL connection utilities for source and destination servers
// ABOUTME: Handles connection settings, TLS setup, error classification, and retries

use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

use crate::config::PostgresEndpoint;
use crate::error::{MigrateError, Result};
use crate::utils;

const APPLICATION_NAME: &str = "db-migrator";

/// Session settings that decide how values are rendered as text.
///
/// Rows travel as text from one server to the other, so both ends must agree
/// on date order, interval style, time zone, float precision, and currency
/// format whatever their server or database defaults are.
const TEXT_FORMAT_OPTIONS: &str = "-c DateStyle=ISO,YMD -c IntervalStyle=postgres \
     -c TimeZone=UTC -c extra_float_digits=3 -c lc_monetary=C";

/// Build driver settings for `database` on `endpoint`
///
/// Every session pins [`TEXT_FORMAT_OPTIONS`]. TCP keepalives are always
/// enabled so that long table reads survive idle timeouts on load balancers:
/// - keepalives on
/// - first keepalive after 60 seconds idle
/// - then every 10 seconds
pub fn build_config(endpoint: &PostgresEndpoint, database: &str) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&endpoint.host)
        .port(endpoint.port)
        .user(&endpoint.user)
        .password(&endpoint.password)
        .dbname(database)
        .application_name(APPLICATION_NAME)
        .options(TEXT_FORMAT_OPTIONS)
        .connect_timeout(Duration::from_secs(30))
        .keepalives(true)
        .keepalives_idle(Duration::from_secs(60))
        .keepalives_interval(Duration::from_secs(10));
    config
}

/// Turn a driver connection error into a message that says what to check
pub fn classify_connect_error(target: &str, error_msg: &str) -> MigrateError {
    let message = if error_msg.contains("password authentication failed") {
        "Authentication failed: Invalid username or password. \
         Please verify your database credentials."
            .to_string()
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        format!(
            "Database does not exist on this server. \
             Create it (with its schema) first. Error: {}",
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect")
    {
        format!(
            "Connection refused: Unable to reach database server. \
             Check the host and port, that the server is running, \
             and that firewall rules allow connections. Error: {}",
            error_msg
        )
    } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
        format!(
            "Connection timeout: Database server did not respond in time. Error: {}",
            error_msg
        )
    } else if error_msg.contains("SSL") || error_msg.contains("TLS") {
        format!(
            "TLS/SSL error: Failed to establish secure connection. Error: {}",
            error_msg
        )
    } else if error_msg.contains("no pg_hba.conf entry") {
        format!(
            "Access denied: No pg_hba.conf entry for host. \
             The server does not accept connections from this host. Error: {}",
            error_msg
        )
    } else {
        format!("Failed to connect to database: {}", error_msg)
    };

    MigrateError::connectivity(target, message)
}

/// Describe a driver error, including the server's SQLSTATE and detail when present
pub fn describe_pg_error(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => {
            let mut text = format!("{} (SQLSTATE {})", db.message(), db.code().code());
            if let Some(detail) = db.detail() {
                text.push_str(": ");
                text.push_str(detail);
            }
            text
        }
        None => err.to_string(),
    }
}

/// Connect to `database` on `endpoint` with TLS support
///
/// TLS is negotiated when the server offers it. The connection task is
/// spawned on the runtime and ends when the returned client is dropped.
///
/// # Errors
///
/// Returns [`MigrateError::Connectivity`] when the server is unreachable,
/// rejects the credentials, or the database does not exist.
///
/// # Examples
///
/// ```no_run
/// # use db_migrator::config::PostgresEndpoint;
/// # use db_migrator::postgres::connect;
/// # async fn example() -> db_migrator::error::Result<()> {
/// let endpoint = PostgresEndpoint {
///     host: "localhost".to_string(),
///     port: 5432,
///     user: "postgres".to_string(),
///     password: "secret".to_string(),
/// };
/// let client = connect(&endpoint, "shop").await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(endpoint: &PostgresEndpoint, database: &str) -> Result<Client> {
    let target = format!("database '{}' on {}", database, endpoint);
    let config = build_config(endpoint, database);

    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .map_err(|e| MigrateError::connectivity(&target, format!("TLS setup failed: {}", e)))?;
    let tls = MakeTlsConnector::new(tls_connector);

    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| classify_connect_error(&target, &describe_pg_error(&e)))?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    Ok(client)
}

/// Connect with exponential backoff (1s, 2s, 4s, ...) for transient failures
pub async fn connect_with_retry(
    endpoint: &PostgresEndpoint,
    database: &str,
    max_retries: u32,
) -> Result<Client> {
    utils::retry_with_backoff(
        || connect(endpoint, database),
        max_retries,
        Duration::from_secs(1),
    )
    .await
}
