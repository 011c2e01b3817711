// ABOUTME: Library module for db-migrator
// ABOUTME: Exports the relational and key-value pipelines for use in the binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod filters;
pub mod keyvalue;
pub mod migration;
pub mod postgres;
pub mod report;
pub mod utils;
