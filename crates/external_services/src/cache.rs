//! Shared cache tier.
//!
//! Two implementations behind one trait: Redis when it is reachable at
//! startup, otherwise a no-op client that always misses.

use crate::error::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis key holding the serialized market snapshot.
pub const SNAPSHOT_CACHE_KEY: &str = "coin_list_cache";

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` for `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Read and decode a JSON value. Decode failures count as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn CacheClient, key: &str) -> Result<Option<T>> {
    let Some(raw) = cache.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Discarding undecodable cache entry '{}': {}", key, e);
            Ok(None)
        }
    }
}

/// Encode and store a JSON value.
pub async fn set_json<T: Serialize>(
    cache: &dyn CacheClient,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    let json = serde_json::to_string(value)?;
    cache.set_ex(key, &json, ttl).await
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Open the client and check the server answers PING.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let cache = Self::new(redis_url)?;
        let mut conn = cache.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(cache)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        debug!("Redis GET '{}': {}", key, if value.is_some() { "hit" } else { "miss" });
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl CacheClient for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "noop"
    }
}

/// Pick the cache backend once at startup.
pub async fn select_cache(redis_url: Option<&str>) -> Arc<dyn CacheClient> {
    let Some(url) = redis_url else {
        info!("REDIS_URL not set, shared cache disabled");
        return Arc::new(NoopCache);
    };

    match RedisCache::connect(url).await {
        Ok(cache) => {
            info!("Connected to Redis at {}", url);
            Arc::new(cache)
        }
        Err(e) => {
            warn!("Redis unavailable at {} ({}), shared cache disabled", url, e);
            Arc::new(NoopCache)
        }
    }
}
