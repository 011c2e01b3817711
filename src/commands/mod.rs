// ABOUTME: Command implementations for each migration pipeline
// ABOUTME: Exports the postgres and redis commands invoked by the CLI

pub mod postgres;
pub mod redis;

pub use self::postgres::postgres;
pub use self::redis::redis;
