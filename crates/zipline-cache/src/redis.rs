use async_trait::async_trait;
use jiff::Timestamp;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, trace, warn};
use zipline_core::cache::{effective_ttl, Result, KEY_PREFIX};
use zipline_core::{CacheEntry, CacheError, CacheLookup, CacheStats, Code, UrlCache};

/// A Redis-based implementation of [`UrlCache`].
///
/// Entries are stored as JSON strings under `url:<code>`. The
/// `ConnectionManager` reconnects on its own, so a dropped connection
/// degrades individual operations instead of wedging the tier.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    key_prefix: String,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() {
        CacheError::Timeout(message)
    } else if err.is_connection_refusal() || err.is_connection_dropped() {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

impl RedisCache {
    /// Creates a new Redis cache.
    ///
    /// # Arguments
    ///
    /// * `conn` - A managed Redis connection
    /// * `positive_ttl` - Lifetime of entries for live records
    /// * `negative_ttl` - Lifetime of tombstones for unknown codes
    pub fn new(conn: ConnectionManager, positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            conn,
            key_prefix: KEY_PREFIX.to_string(),
            positive_ttl,
            negative_ttl,
        }
    }

    /// Overrides the key prefix (e.g. to namespace a shared instance).
    pub fn with_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    fn cache_key(&self, code: &Code) -> String {
        format!("{}{}", self.key_prefix, code.as_str())
    }

    async fn write_entry(&self, code: &Code, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        let key = self.cache_key(code);

        let json = serde_json::to_string(entry)
            .map_err(|e| CacheError::Serialization(format!("failed to serialize entry: {e}")))?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, json, ttl.as_secs().max(1))
            .await
            .map_err(|e| {
                warn!(code = %code, error = %e, "failed to write cache entry");
                map_redis_error("failed to write value to Redis", e)
            })?;

        debug!(code = %code, ttl_secs = ttl.as_secs(), "cached entry");
        Ok(())
    }
}

#[async_trait]
impl UrlCache for RedisCache {
    async fn get(&self, code: &Code) -> Result<CacheLookup> {
        let key = self.cache_key(code);
        trace!(code = %code, "fetching entry from Redis");

        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<CacheEntry>(&cached) {
                Ok(entry) => {
                    debug!(code = %code, "cache hit");
                    Ok(entry.classify(Timestamp::now()))
                }
                Err(e) => {
                    warn!(code = %code, error = %e, "dropping undecodable cache entry");
                    let _ = conn.del::<_, ()>(&key).await;
                    Err(CacheError::InvalidData(format!(
                        "invalid cached value for key '{key}': {e}"
                    )))
                }
            },
            Ok(None) => {
                trace!(code = %code, "cache miss");
                Ok(CacheLookup::Miss)
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Redis error on get");
                Err(map_redis_error("failed to fetch value from Redis", e))
            }
        }
    }

    async fn set(&self, code: &Code, entry: &CacheEntry) -> Result<()> {
        let now = Timestamp::now();
        let Some(ttl) = effective_ttl(self.positive_ttl, entry.expire_at, now) else {
            // Already past its expiry: a write would only be evicted.
            trace!(code = %code, "skipping cache write for expired record");
            return Ok(());
        };

        self.write_entry(code, entry, ttl).await
    }

    async fn set_negative(&self, code: &Code) -> Result<()> {
        let entry = CacheEntry::negative(Timestamp::now());
        self.write_entry(code, &entry, self.negative_ttl).await
    }

    async fn delete(&self, code: &Code) -> Result<()> {
        let key = self.cache_key(code);
        trace!(code = %code, "removing entry from Redis");

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| map_redis_error("failed to delete value from Redis", e))
    }

    async fn invalidate_many(&self, codes: &[Code]) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for code in codes {
            pipe.del(self.cache_key(code)).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to invalidate batch", e))?;

        debug!(count = codes.len(), "invalidated cache entries");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("ping failed", e))?;
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut conn = self.conn.clone();
        let entries: u64 = redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("dbsize failed", e))?;

        Ok(CacheStats {
            backend: "redis",
            entries: Some(entries),
        })
    }
}
