//! Redis-backed [`KvStore`], shared by every instance pointed at the same server.

use std::time::Duration;

use async_trait::async_trait;
use redis::RedisError;
use redis::aio::ConnectionManager;
use tracing::info;

use super::store::{KvStore, ScanPage, StoreError};

const SCAN_DONE: &str = "0";

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect once; the connection manager reconnects on its own afterwards.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        info!("Connected to redis cache store");
        Ok(Self { conn })
    }
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        StoreError::unavailable(err)
    } else {
        StoreError::Protocol(err.to_string())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(removed)
    }

    async fn scan(
        &self,
        cursor: Option<&str>,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, StoreError> {
        let mut conn = self.conn.clone();
        let (next, keys): (String, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor.unwrap_or(SCAN_DONE))
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(ScanPage {
            keys,
            next: (next != SCAN_DONE).then_some(next),
        })
    }
}
