pub mod keys;

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

/// Hit count for a fixed window and the time left before it resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHits {
    pub hits: u64,
    pub reset_after: Duration,
}

impl RedisCache {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(connection))
    }

    /// Counts one hit against `key`. The first hit of a window starts its
    /// expiry so every instance sharing the server sees the same window.
    pub async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowHits, redis::RedisError> {
        let mut conn = self.connection.clone();
        let window_ms = window.as_millis().max(1) as i64;

        let (hits, ttl_ms): (u64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .pttl(key)
            .query_async(&mut conn)
            .await?;

        let ttl_ms = if ttl_ms < 0 {
            let _: bool = conn.pexpire(key, window_ms).await?;
            window_ms
        } else {
            ttl_ms
        };

        Ok(WindowHits {
            hits,
            reset_after: Duration::from_millis(ttl_ms as u64),
        })
    }

    pub async fn is_connected(&self) -> bool {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
