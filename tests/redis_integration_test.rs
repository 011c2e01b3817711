// ABOUTME: Integration tests for the key-value pipeline against real Redis servers
// ABOUTME: Requires TEST_REDIS_SOURCE_HOST and TEST_REDIS_DEST_HOST; run with --ignored

use db_migrator::config::{KeyCopyOptions, RedisEndpoint};
use db_migrator::keyvalue::{migrate_keys, KeySource, KeyValue, ReadOutcome, RedisStore};
use std::env;
use std::time::Duration;

fn endpoint(role: &str) -> Option<RedisEndpoint> {
    let var = |name: &str| env::var(format!("TEST_REDIS_{}_{}", role, name)).ok();
    Some(RedisEndpoint {
        host: var("HOST")?,
        port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(6379),
        password: var("PASSWORD"),
        db: var("DB").and_then(|d| d.parse().ok()).unwrap_or(15),
    })
}

async fn seed(endpoint: &RedisEndpoint) -> anyhow::Result<()> {
    let auth = endpoint
        .password
        .as_deref()
        .map(|p| format!(":{}@", p))
        .unwrap_or_default();
    let info = format!(
        "redis://{}{}:{}/{}",
        auth, endpoint.host, endpoint.port, endpoint.db
    );
    let client = redis::Client::open(info)?;
    let mut con = client.get_multiplexed_async_connection().await?;

    let _: () = redis::pipe()
        .cmd("FLUSHDB").ignore()
        .cmd("SET").arg("it:string").arg(b"\x00\xffbinary".as_slice()).ignore()
        .cmd("EXPIRE").arg("it:string").arg(100).ignore()
        .cmd("RPUSH").arg("it:list").arg("c").arg("a").arg("b").ignore()
        .cmd("HSET").arg("it:hash").arg("f").arg("v").ignore()
        .cmd("SADD").arg("it:set").arg("x").arg("y").ignore()
        .cmd("ZADD").arg("it:zset").arg(1.5).arg("m1").arg(-2).arg("m2").ignore()
        .query_async(&mut con)
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_keys_copied_with_ttl() {
    let source_endpoint = endpoint("SOURCE").expect("TEST_REDIS_SOURCE_HOST must be set");
    let dest_endpoint = endpoint("DEST").expect("TEST_REDIS_DEST_HOST must be set");
    seed(&source_endpoint).await.unwrap();

    let mut source = RedisStore::connect(&source_endpoint).await.unwrap();
    let mut destination = RedisStore::connect(&dest_endpoint).await.unwrap();
    let options = KeyCopyOptions {
        pattern: "it:*".to_string(),
        ..Default::default()
    };

    let summary = migrate_keys(&mut source, &mut destination, &options)
        .await
        .unwrap();
    assert_eq!(summary.copied, 5);
    assert!(summary.is_success());

    match destination.read_entry(b"it:string").await.unwrap() {
        ReadOutcome::Entry(entry) => {
            assert_eq!(entry.value, KeyValue::String(b"\x00\xffbinary".to_vec()));
            let ttl = entry.ttl.expect("TTL should be preserved");
            assert!(ttl <= Duration::from_secs(100) && ttl > Duration::from_secs(90));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    match destination.read_entry(b"it:list").await.unwrap() {
        ReadOutcome::Entry(entry) => {
            assert_eq!(
                entry.value,
                KeyValue::List(vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()])
            );
            assert_eq!(entry.ttl, None);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(
        destination.read_entry(b"it:absent").await.unwrap(),
        ReadOutcome::Missing
    );
}
