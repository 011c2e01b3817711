// ABOUTME: PostgreSQL driver glue for the relational migration
// ABOUTME: Connection setup plus the session implementations used by the orchestrator

pub mod connection;
pub mod session;

pub use connection::{connect, connect_with_retry};
pub use session::{PostgresDestination, PostgresSessionFactory, PostgresSource};
