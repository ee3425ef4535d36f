use async_trait::async_trait;
use jiff::Timestamp;
use moka::future::Cache;
use std::time::{Duration, Instant};
use tracing::trace;
use zipline_core::cache::{effective_ttl, Result};
use zipline_core::{CacheEntry, CacheLookup, CacheStats, Code, UrlCache};

#[derive(Debug, Clone)]
struct Stored {
    entry: CacheEntry,
    /// Point at which the entry's TTL elapses. Checked on read because
    /// Moka's built-in TTL is per-cache, not per-entry.
    deadline: Instant,
}

/// An in-memory implementation of [`UrlCache`] backed by Moka.
///
/// Honors the same per-entry TTL clipping as the Redis backend, so
/// tests against it exercise the real expiry behavior. Suitable as the
/// cache tier of a single-node deployment.
#[derive(Clone)]
pub struct MemoryCache {
    cache: Cache<String, Stored>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl MemoryCache {
    /// Creates a cache with the given TTLs and a default capacity.
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self::with_capacity(10_000, positive_ttl, negative_ttl)
    }

    /// Creates a cache bounded to `max_capacity` entries.
    pub fn with_capacity(max_capacity: u64, positive_ttl: Duration, negative_ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).build();
        Self {
            cache,
            positive_ttl,
            negative_ttl,
        }
    }

    async fn store(&self, code: &Code, entry: CacheEntry, ttl: Duration) {
        let stored = Stored {
            entry,
            deadline: Instant::now() + ttl,
        };
        self.cache.insert(code.as_str().to_string(), stored).await;
    }
}

#[async_trait]
impl UrlCache for MemoryCache {
    async fn get(&self, code: &Code) -> Result<CacheLookup> {
        let key = code.as_str().to_string();

        match self.cache.get(&key).await {
            Some(stored) if stored.deadline <= Instant::now() => {
                // TTL elapsed; drop the entry lazily.
                self.cache.invalidate(&key).await;
                Ok(CacheLookup::Miss)
            }
            Some(stored) => Ok(stored.entry.classify(Timestamp::now())),
            None => Ok(CacheLookup::Miss),
        }
    }

    async fn set(&self, code: &Code, entry: &CacheEntry) -> Result<()> {
        let now = Timestamp::now();
        let Some(ttl) = effective_ttl(self.positive_ttl, entry.expire_at, now) else {
            trace!(code = %code, "skipping cache write for expired record");
            return Ok(());
        };

        self.store(code, entry.clone(), ttl).await;
        Ok(())
    }

    async fn set_negative(&self, code: &Code) -> Result<()> {
        let entry = CacheEntry::negative(Timestamp::now());
        self.store(code, entry, self.negative_ttl).await;
        Ok(())
    }

    async fn delete(&self, code: &Code) -> Result<()> {
        self.cache.invalidate(&code.as_str().to_string()).await;
        Ok(())
    }

    async fn invalidate_many(&self, codes: &[Code]) -> Result<()> {
        for code in codes {
            self.cache.invalidate(&code.as_str().to_string()).await;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        self.cache.run_pending_tasks().await;
        Ok(CacheStats {
            backend: "memory",
            entries: Some(self.cache.entry_count()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;
    use zipline_core::ShortUrl;

    const DAY: Duration = Duration::from_secs(86_400);
    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn code(s: &str) -> Code {
        Code::new_unchecked(s)
    }

    fn record(expire_at: Option<Timestamp>) -> ShortUrl {
        ShortUrl {
            id: 1,
            code: code("abc12345"),
            long_url: "https://example.com".to_string(),
            created_at: Timestamp::now(),
            expire_at,
            is_deleted: false,
            custom_alias: false,
            created_by: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn set_then_get_hits() {
        let cache = MemoryCache::new(DAY, FIVE_MINUTES);
        let c = code("abc12345");
        let entry = CacheEntry::positive(&record(None));

        cache.set(&c, &entry).await.unwrap();

        match cache.get(&c).await.unwrap() {
            CacheLookup::Hit(found) => assert_eq!(found, entry),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absent_key_misses() {
        let cache = MemoryCache::new(DAY, FIVE_MINUTES);
        assert_eq!(cache.get(&code("nope1234")).await.unwrap(), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn negative_entry_reads_as_deleted() {
        let cache = MemoryCache::new(DAY, FIVE_MINUTES);
        let c = code("abc12345");

        cache.set_negative(&c).await.unwrap();
        assert_eq!(cache.get(&c).await.unwrap(), CacheLookup::Deleted);
    }

    #[tokio::test]
    async fn positive_set_overwrites_negative_entry() {
        let cache = MemoryCache::new(DAY, FIVE_MINUTES);
        let c = code("abc12345");

        cache.set_negative(&c).await.unwrap();
        cache
            .set(&c, &CacheEntry::positive(&record(None)))
            .await
            .unwrap();

        assert!(matches!(
            cache.get(&c).await.unwrap(),
            CacheLookup::Hit(_)
        ));
    }

    #[tokio::test]
    async fn expired_record_is_not_written() {
        let cache = MemoryCache::new(DAY, FIVE_MINUTES);
        let c = code("abc12345");
        let past = Timestamp::now() - SignedDuration::from_secs(10);

        cache
            .set(&c, &CacheEntry::positive(&record(Some(past))))
            .await
            .unwrap();

        assert_eq!(cache.get(&c).await.unwrap(), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn entry_past_its_record_expiry_reads_as_expired() {
        let cache = MemoryCache::new(DAY, FIVE_MINUTES);
        let c = code("abc12345");
        let soon = Timestamp::now() + SignedDuration::from_secs(1);

        cache
            .set(&c, &CacheEntry::positive(&record(Some(soon))))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(cache.get(&c).await.unwrap(), CacheLookup::Expired);
    }

    #[tokio::test]
    async fn ttl_deadline_turns_into_miss() {
        let cache = MemoryCache::new(Duration::from_millis(20), FIVE_MINUTES);
        let c = code("abc12345");

        cache
            .set(&c, &CacheEntry::positive(&record(None)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get(&c).await.unwrap(), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn delete_and_invalidate_many_remove_entries() {
        let cache = MemoryCache::new(DAY, FIVE_MINUTES);
        let entry = CacheEntry::positive(&record(None));

        for c in ["aaaa1111", "bbbb2222", "cccc3333"] {
            cache.set(&code(c), &entry).await.unwrap();
        }

        cache.delete(&code("aaaa1111")).await.unwrap();
        assert_eq!(cache.get(&code("aaaa1111")).await.unwrap(), CacheLookup::Miss);

        cache
            .invalidate_many(&[code("bbbb2222"), code("cccc3333")])
            .await
            .unwrap();
        assert_eq!(cache.get(&code("bbbb2222")).await.unwrap(), CacheLookup::Miss);
        assert_eq!(cache.get(&code("cccc3333")).await.unwrap(), CacheLookup::Miss);
    }
}
