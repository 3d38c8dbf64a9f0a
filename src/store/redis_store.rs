use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ErrorKind, InfoDict};
use tracing::info;

use super::{KeyValueStore, StoreInfo, StoreResult};
use crate::core::error::StoreError;

/// Redis-backed store over one multiplexed connection.
///
/// The connection is cheap to clone; every command clones it so callers on
/// different tasks pipeline onto the same socket.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Opens the connection and verifies the server answers
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", redis_url, e)))?;
        let store = Self { conn };
        store.ping().await?;
        info!(url = %redis_url, "Connected to Redis");
        Ok(store)
    }

    #[inline]
    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn ping(&self) -> StoreResult<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn()).await?;
        Ok(())
    }

    async fn rpush(&self, key: &str, value: String) -> StoreResult<usize> {
        let len: usize = redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut self.conn())
            .await?;
        Ok(len)
    }

    async fn lpush(&self, key: &str, value: String) -> StoreResult<usize> {
        let len: usize = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut self.conn())
            .await?;
        Ok(len)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.conn())
            .await?;
        Ok(items)
    }

    async fn lindex(&self, key: &str, index: isize) -> StoreResult<Option<String>> {
        let item: Option<String> = redis::cmd("LINDEX")
            .arg(key)
            .arg(index)
            .query_async(&mut self.conn())
            .await?;
        Ok(item)
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        let _: () = redis::cmd("LTRIM")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let set: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis() as u64)
            .query_async(&mut self.conn())
            .await?;
        Ok(set)
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let removed: usize = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn())
            .await?;
        Ok(removed > 0)
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<bool> {
        let result: redis::RedisResult<()> = redis::cmd("RENAME")
            .arg(from)
            .arg(to)
            .query_async(&mut self.conn())
            .await;
        match result {
            Ok(()) => Ok(true),
            // RENAME on a missing key is a server error, not a failure for us
            Err(e) if e.kind() == ErrorKind::ResponseError && e.to_string().contains("no such key") => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(&self, channel: &str, message: String) -> StoreResult<usize> {
        let receivers: usize = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut self.conn())
            .await?;
        Ok(receivers)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut self.conn())
            .await?;
        Ok(keys)
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        let info: InfoDict = redis::cmd("INFO").query_async(&mut self.conn()).await?;
        Ok(StoreInfo {
            used_memory_human: info.get("used_memory_human").unwrap_or_default(),
            used_memory_peak_human: info.get("used_memory_peak_human").unwrap_or_default(),
            connected_clients: info.get("connected_clients").unwrap_or_default(),
        })
    }
}
