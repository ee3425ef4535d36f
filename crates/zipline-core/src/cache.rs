//! The cache-tier contract: entry format, lookup outcomes, and TTL
//! clipping rules shared by every cache implementation.

use crate::code::Code;
use crate::error::CacheError;
use crate::record::ShortUrl;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Every cache key is the code prefixed with this namespace.
pub const KEY_PREFIX: &str = "url:";

/// Slack added on top of the time-until-expiry when clipping the TTL,
/// so a Get near the expiry boundary observes the entry (and classifies
/// it as expired) instead of missing and hitting the store.
pub const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// The serialized cache value.
///
/// A *negative* entry (written for codes the store does not know) has
/// `is_deleted = true` and no `long_url`. Timestamps round-trip with
/// second precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub long_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expire_at: Option<Timestamp>,
    pub is_deleted: bool,
    pub created_at: Timestamp,
}

impl CacheEntry {
    /// Builds a positive entry from a stored record.
    pub fn positive(record: &ShortUrl) -> Self {
        Self {
            long_url: Some(record.long_url.clone()),
            expire_at: record.expire_at,
            is_deleted: record.is_deleted,
            created_at: record.created_at,
        }
    }

    /// Builds a negative (tombstone) entry.
    pub fn negative(now: Timestamp) -> Self {
        Self {
            long_url: None,
            expire_at: None,
            is_deleted: true,
            created_at: now,
        }
    }

    /// Classifies the entry as seen at `now`.
    pub fn classify(&self, now: Timestamp) -> CacheLookup {
        if self.is_deleted {
            return CacheLookup::Deleted;
        }
        if let Some(expire_at) = self.expire_at {
            if now >= expire_at {
                return CacheLookup::Expired;
            }
        }
        CacheLookup::Hit(self.clone())
    }
}

/// Outcome of a cache lookup.
///
/// `Miss` means the key is absent; `Deleted` and `Expired` are negative
/// outcomes carried by a present entry and must not fall through to the
/// store.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
    Deleted,
    Expired,
}

/// Operational counters reported by a cache backend.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub backend: &'static str,
    pub entries: Option<u64>,
}

/// Computes the TTL for a positive cache write.
///
/// The effective TTL is `min(positive_ttl, time_until_expiry + buffer)`
/// where the buffer keeps the entry observable through its final TTL
/// second. Returns `None` when the record is already past its expiry,
/// in which case the write must be skipped.
pub fn effective_ttl(
    positive_ttl: Duration,
    expire_at: Option<Timestamp>,
    now: Timestamp,
) -> Option<Duration> {
    let Some(expire_at) = expire_at else {
        return Some(positive_ttl);
    };

    let until_expiry = expire_at.as_second() - now.as_second();
    if until_expiry <= 0 {
        return None;
    }

    let clipped = Duration::from_secs(until_expiry as u64) + EXPIRY_BUFFER;
    Some(positive_ttl.min(clipped))
}

/// Capability set of the cache tier.
///
/// Any failure from these operations is non-authoritative: the service
/// treats it as a miss, degrading latency but never correctness.
#[async_trait]
pub trait UrlCache: Send + Sync + 'static {
    /// Looks up the entry for a code.
    async fn get(&self, code: &Code) -> Result<CacheLookup>;

    /// Writes a positive entry with the clipped TTL; skipped entirely
    /// when the record is already past its expiry. Overwrites any
    /// negative entry under the same key.
    async fn set(&self, code: &Code, entry: &CacheEntry) -> Result<()>;

    /// Writes a tombstone for a code the store does not know, with the
    /// (short) negative TTL.
    async fn set_negative(&self, code: &Code) -> Result<()>;

    /// Removes the entry for a code.
    async fn delete(&self, code: &Code) -> Result<()>;

    /// Removes the entries for a batch of codes in one round trip.
    async fn invalidate_many(&self, codes: &[Code]) -> Result<()>;

    /// Checks connectivity to the backend.
    async fn ping(&self) -> Result<()>;

    /// Reports operational counters.
    async fn stats(&self) -> Result<CacheStats>;
}
