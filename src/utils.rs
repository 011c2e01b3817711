// ABOUTME: Utility functions for SQL quoting, list parsing, and retry logic
// ABOUTME: Shared by the PostgreSQL and Redis pipelines

use std::fmt::Display;
use std::time::Duration;

/// Retry an async operation with exponential backoff
///
/// Runs `operation` up to `max_retries + 1` times, doubling the delay after
/// each failure. Returns the last error when every attempt fails.
///
/// # Examples
///
/// ```no_run
/// # use db_migrator::utils::retry_with_backoff;
/// # use std::time::Duration;
/// # async fn example() -> Result<(), String> {
/// let value = retry_with_backoff(
///     || async { Ok::<_, String>(42) },
///     3,
///     Duration::from_secs(1),
/// )
/// .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}; retrying in {:?}...",
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // Exponential backoff
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Quote a PostgreSQL identifier, doubling embedded quotes
///
/// ```
/// # use db_migrator::utils::quote_ident;
/// assert_eq!(quote_ident("orders"), "\"orders\"");
/// assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Schema-qualified, quoted table name
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Quote a value as a PostgreSQL string literal
///
/// Values containing backslashes use the escape string syntax so the result
/// is correct whatever `standard_conforming_strings` is set to.
///
/// ```
/// # use db_migrator::utils::quote_literal;
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// assert_eq!(quote_literal("a\\b"), "E'a\\\\b'");
/// ```
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

/// Trim and drop empty entries from an already split list
pub fn clean_name_list(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_quote_ident_plain_and_mixed_case() {
        assert_eq!(quote_ident("OrderItems"), "\"OrderItems\"");
        assert_eq!(quote_ident("public"), "\"public\"");
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(qualified_table("public", "orders"), "\"public\".\"orders\"");
    }

    #[test]
    fn test_quote_literal_injection_attempt() {
        let quoted = quote_literal("x'); DROP TABLE users; --");
        assert_eq!(quoted, "'x''); DROP TABLE users; --'");
    }

    #[test]
    fn test_quote_literal_backslash_and_quote() {
        assert_eq!(quote_literal("c:\\it's"), "E'c:\\\\it''s'");
    }

    #[test]
    fn test_clean_name_list() {
        let names = vec![" db1 ".to_string(), "".to_string(), "db2".to_string()];
        assert_eq!(clean_name_list(names), vec!["db1", "db2"]);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result = retry_with_backoff(
            || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(format!("attempt {} failed", n))
                } else {
                    Ok(n)
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<(), String> = retry_with_backoff(
            || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {}", n))
            },
            2,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
