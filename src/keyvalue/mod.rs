// ABOUTME: Key-value migration between two Redis instances
// ABOUTME: Entry model plus the read/write interfaces the copy loop depends on

pub mod copier;
pub mod store;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub use copier::{migrate_keys, KeyCopySummary, KeyFailure};
pub use store::RedisStore;

/// Value of one key, by Redis type
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    String(Vec<u8>),
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    /// Items in list order, head first
    List(Vec<Vec<u8>>),
    Set(Vec<Vec<u8>>),
    /// (score, member) pairs
    SortedSet(Vec<(f64, Vec<u8>)>),
}

impl KeyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            KeyValue::String(_) => "string",
            KeyValue::Hash(_) => "hash",
            KeyValue::List(_) => "list",
            KeyValue::Set(_) => "set",
            KeyValue::SortedSet(_) => "zset",
        }
    }

    /// Redis never stores empty collections; an empty value means the key is gone
    pub fn is_empty(&self) -> bool {
        match self {
            KeyValue::String(_) => false,
            KeyValue::Hash(fields) => fields.is_empty(),
            KeyValue::List(items) | KeyValue::Set(items) => items.is_empty(),
            KeyValue::SortedSet(members) => members.is_empty(),
        }
    }
}

/// One key with its value and remaining time to live
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEntry {
    pub key: Vec<u8>,
    pub value: KeyValue,
    /// `None` when the key never expires
    pub ttl: Option<Duration>,
}

/// Result of reading one key
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Entry(KeyEntry),
    /// Deleted or expired between enumeration and read
    Missing,
    /// A type this tool does not copy (streams, module types)
    Unsupported(String),
}

/// Remaining lifetime as reported by PTTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Persistent,
    Expires(Duration),
    Missing,
}

impl Ttl {
    /// Interpret a PTTL reply: -1 = no expiry, -2 = no such key
    pub fn from_pttl(millis: i64) -> Self {
        match millis {
            -1 => Ttl::Persistent,
            ms if ms > 0 => Ttl::Expires(Duration::from_millis(ms as u64)),
            // 0 ms left: the key is expiring right now
            _ => Ttl::Missing,
        }
    }
}

/// Read side of the key-value copy
#[async_trait]
pub trait KeySource: Send {
    /// Every key matching `pattern`, each once
    async fn scan_keys(&mut self, pattern: &str, count: usize) -> Result<Vec<Vec<u8>>>;

    async fn read_entry(&mut self, key: &[u8]) -> Result<ReadOutcome>;
}

/// Write side of the key-value copy
#[async_trait]
pub trait KeySink: Send {
    /// Replace the destination key with `entry`, including its expiry
    async fn write_entry(&mut self, entry: &KeyEntry) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_from_pttl() {
        assert_eq!(Ttl::from_pttl(-1), Ttl::Persistent);
        assert_eq!(Ttl::from_pttl(-2), Ttl::Missing);
        assert_eq!(Ttl::from_pttl(0), Ttl::Missing);
        assert_eq!(
            Ttl::from_pttl(100_000),
            Ttl::Expires(Duration::from_secs(100))
        );
    }

    #[test]
    fn test_empty_collections_count_as_missing() {
        assert!(KeyValue::List(vec![]).is_empty());
        assert!(KeyValue::Hash(vec![]).is_empty());
        assert!(!KeyValue::String(vec![]).is_empty());
        assert_eq!(KeyValue::SortedSet(vec![]).type_name(), "zset");
    }
}
