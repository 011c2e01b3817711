// ABOUTME: Redis connection and command glue for the key-value migration
// ABOUTME: Reads keys by type with their TTL and writes them back atomically

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, IntoConnectionInfo, RedisError};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::{KeyEntry, KeySink, KeySource, KeyValue, ReadOutcome, Ttl};
use crate::config::RedisEndpoint;
use crate::error::{MigrateError, Result};
use crate::utils;

/// One Redis logical database, usable as a source or a sink
pub struct RedisStore {
    con: MultiplexedConnection,
    endpoint: String,
}

impl RedisStore {
    /// Connect to `endpoint` and verify the connection with PING
    pub async fn connect(endpoint: &RedisEndpoint) -> Result<Self> {
        let target = format!("redis {}", endpoint);
        let connectivity = |e: RedisError| MigrateError::connectivity(&target, e.to_string());

        let mut info = (endpoint.host.as_str(), endpoint.port)
            .into_connection_info()
            .map_err(connectivity)?;
        info.redis.db = endpoint.db;
        info.redis.password = endpoint.password.clone();

        let client = redis::Client::open(info).map_err(connectivity)?;
        let mut con = client
            .get_multiplexed_async_connection()
            .await
            .map_err(connectivity)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut con)
            .await
            .map_err(connectivity)?;
        tracing::debug!("Connected to {}", target);

        Ok(Self {
            con,
            endpoint: endpoint.to_string(),
        })
    }

    /// Connect with exponential backoff (1s, 2s, 4s, ...)
    pub async fn connect_with_retry(endpoint: &RedisEndpoint, max_retries: u32) -> Result<Self> {
        utils::retry_with_backoff(
            || Self::connect(endpoint),
            max_retries,
            Duration::from_secs(1),
        )
        .await
    }

    fn command_error(&self, command: &str, key: &[u8], err: RedisError) -> MigrateError {
        if err.is_connection_dropped() || err.is_io_error() || err.is_timeout() {
            return MigrateError::connectivity(format!("redis {}", self.endpoint), err.to_string());
        }
        MigrateError::query(
            format!("{} {} on {}", command, String::from_utf8_lossy(key), self.endpoint),
            err,
        )
    }

    async fn read_value(&mut self, kind: &str, key: &[u8]) -> Result<Fetched> {
        let value = match kind {
            "string" => {
                let value: Option<Vec<u8>> = self
                    .con
                    .get(key)
                    .await
                    .map_err(|e| self.command_error("GET", key, e))?;
                Fetched::string(value)
            }
            "hash" => {
                let fields: HashMap<Vec<u8>, Vec<u8>> = self
                    .con
                    .hgetall(key)
                    .await
                    .map_err(|e| self.command_error("HGETALL", key, e))?;
                Fetched::collection(KeyValue::Hash(fields.into_iter().collect()))
            }
            "list" => {
                let items: Vec<Vec<u8>> = self
                    .con
                    .lrange(key, 0, -1)
                    .await
                    .map_err(|e| self.command_error("LRANGE", key, e))?;
                Fetched::collection(KeyValue::List(items))
            }
            "set" => {
                let members: Vec<Vec<u8>> = self
                    .con
                    .smembers(key)
                    .await
                    .map_err(|e| self.command_error("SMEMBERS", key, e))?;
                Fetched::collection(KeyValue::Set(members))
            }
            "zset" => {
                let flat: Vec<Vec<u8>> = redis::cmd("ZRANGE")
                    .arg(key)
                    .arg(0)
                    .arg(-1)
                    .arg("WITHSCORES")
                    .query_async(&mut self.con)
                    .await
                    .map_err(|e| self.command_error("ZRANGE", key, e))?;
                Fetched::collection(KeyValue::SortedSet(parse_scored_members(key, flat)?))
            }
            _ => Fetched::Unsupported,
        };
        Ok(value)
    }
}

/// What the type-specific read found for a key TYPE had just named
#[derive(Debug, PartialEq)]
enum Fetched {
    Value(KeyValue),
    /// Expired or deleted after TYPE answered
    Gone,
    Unsupported,
}

impl Fetched {
    /// GET answers nil once the key is gone; an empty string is still a value
    fn string(reply: Option<Vec<u8>>) -> Self {
        reply.map_or(Fetched::Gone, |value| Fetched::Value(KeyValue::String(value)))
    }

    /// Redis drops empty collections, so an empty reply means the key went away
    fn collection(value: KeyValue) -> Self {
        if value.is_empty() {
            Fetched::Gone
        } else {
            Fetched::Value(value)
        }
    }
}

/// Turn a flat `member, score, member, score...` reply into (score, member) pairs
fn parse_scored_members(key: &[u8], flat: Vec<Vec<u8>>) -> Result<Vec<(f64, Vec<u8>)>> {
    let mut members = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let Some(member) = iter.next() {
        let raw = iter.next().ok_or_else(|| {
            MigrateError::query(
                format!("ZRANGE {}", String::from_utf8_lossy(key)),
                "reply has a member without a score",
            )
        })?;
        let score = std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| {
                MigrateError::query(
                    format!("ZRANGE {}", String::from_utf8_lossy(key)),
                    format!("invalid score '{}'", String::from_utf8_lossy(&raw)),
                )
            })?;
        members.push((score, member));
    }
    Ok(members)
}

#[async_trait]
impl KeySource for RedisStore {
    async fn scan_keys(&mut self, pattern: &str, count: usize) -> Result<Vec<Vec<u8>>> {
        let mut cursor: u64 = 0;
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut keys = Vec::new();

        // SCAN may return a key more than once across iterations.
        loop {
            let (next, batch): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut self.con)
                .await
                .map_err(|e| self.command_error("SCAN", pattern.as_bytes(), e))?;

            for key in batch {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    async fn read_entry(&mut self, key: &[u8]) -> Result<ReadOutcome> {
        let kind: String = redis::cmd("TYPE")
            .arg(key)
            .query_async(&mut self.con)
            .await
            .map_err(|e| self.command_error("TYPE", key, e))?;

        if kind == "none" {
            return Ok(ReadOutcome::Missing);
        }

        let value = match self.read_value(&kind, key).await? {
            Fetched::Value(value) => value,
            Fetched::Gone => return Ok(ReadOutcome::Missing),
            Fetched::Unsupported => return Ok(ReadOutcome::Unsupported(kind)),
        };

        let pttl: i64 = self
            .con
            .pttl(key)
            .await
            .map_err(|e| self.command_error("PTTL", key, e))?;

        let ttl = match Ttl::from_pttl(pttl) {
            Ttl::Persistent => None,
            Ttl::Expires(remaining) => Some(remaining),
            Ttl::Missing => return Ok(ReadOutcome::Missing),
        };

        Ok(ReadOutcome::Entry(KeyEntry {
            key: key.to_vec(),
            value,
            ttl,
        }))
    }
}

#[async_trait]
impl KeySink for RedisStore {
    async fn write_entry(&mut self, entry: &KeyEntry) -> Result<()> {
        let key = &entry.key;
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();

        match &entry.value {
            KeyValue::String(value) => {
                pipe.set(key, value).ignore();
            }
            KeyValue::Hash(fields) => {
                pipe.hset_multiple(key, fields.as_slice()).ignore();
            }
            KeyValue::List(items) => {
                pipe.rpush(key, items).ignore();
            }
            KeyValue::Set(members) => {
                pipe.sadd(key, members).ignore();
            }
            KeyValue::SortedSet(members) => {
                pipe.zadd_multiple(key, members.as_slice()).ignore();
            }
        }

        if let Some(ttl) = entry.ttl {
            pipe.pexpire(key, ttl.as_millis() as i64).ignore();
        }

        let _: () = pipe
            .query_async(&mut self.con)
            .await
            .map_err(|e| {
                let command = format!("MULTI/EXEC ({})", entry.value.type_name());
                self.command_error(&command, key, e)
            })?;
        Ok(())
    }
}
