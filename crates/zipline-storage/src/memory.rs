use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use zipline_core::store::Result;
use zipline_core::{ClickEvent, Code, NewShortUrl, ShortUrl, StoreError, UrlMetadata, UrlPage, UrlStore};

#[derive(Debug, Clone, Default)]
struct ClickStats {
    total_clicks: i64,
    first_access_at: Option<Timestamp>,
    last_access_at: Option<Timestamp>,
}

/// In-memory implementation of the store contract using DashMap.
///
/// Observable behavior matches [`PostgresStore`](crate::PostgresStore):
/// reads exclude deleted rows, expiry is observed read-only, and codes
/// are never reused. Backs tests and local development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    urls: DashMap<String, ShortUrl>,
    stats: DashMap<String, ClickStats>,
    events: DashMap<String, Vec<(Timestamp, ClickEvent)>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of click events recorded for a code.
    pub fn click_count(&self, code: &Code) -> usize {
        self.events
            .get(code.as_str())
            .map_or(0, |events| events.len())
    }
}

fn is_expired(record: &ShortUrl, now: Timestamp) -> bool {
    record
        .expire_at
        .is_some_and(|expire_at| now.as_second() >= expire_at.as_second())
}

#[async_trait]
impl UrlStore for MemoryStore {
    async fn create(&self, new: NewShortUrl) -> Result<ShortUrl> {
        let entry = self.urls.entry(new.code.as_str().to_string());

        match entry {
            Entry::Occupied(_) => Err(StoreError::Conflict(new.code.to_string())),
            Entry::Vacant(vacant) => {
                let record = ShortUrl {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                    code: new.code,
                    long_url: new.long_url,
                    created_at: Timestamp::now(),
                    expire_at: new.expire_at,
                    is_deleted: false,
                    custom_alias: new.custom_alias,
                    created_by: new.created_by,
                    metadata: new.metadata,
                };
                vacant.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn get_by_code(&self, code: &Code) -> Result<ShortUrl> {
        let record = self
            .urls
            .get(code.as_str())
            .filter(|record| !record.is_deleted)
            .map(|record| record.clone())
            .ok_or(StoreError::NotFound)?;

        if is_expired(&record, Timestamp::now()) {
            return Err(StoreError::Expired);
        }

        Ok(record)
    }

    async fn get_metadata(&self, code: &Code) -> Result<UrlMetadata> {
        let record = self.get_by_code(code).await?;
        let stats = self
            .stats
            .get(code.as_str())
            .map(|stats| stats.clone())
            .unwrap_or_default();

        Ok(UrlMetadata {
            code: record.code,
            long_url: record.long_url,
            created_at: record.created_at,
            expire_at: record.expire_at,
            total_clicks: stats.total_clicks,
            first_access_at: stats.first_access_at,
            last_access_at: stats.last_access_at,
        })
    }

    async fn exists(&self, code: &Code) -> Result<bool> {
        Ok(self.urls.contains_key(code.as_str()))
    }

    async fn soft_delete(&self, code: &Code) -> Result<()> {
        let mut record = self
            .urls
            .get_mut(code.as_str())
            .ok_or(StoreError::NotFound)?;

        if record.is_deleted {
            return Err(StoreError::NotFound);
        }

        record.is_deleted = true;
        Ok(())
    }

    async fn record_click(&self, code: &Code, event: ClickEvent) -> Result<()> {
        let now = Timestamp::now();

        {
            let record = self
                .urls
                .get(code.as_str())
                .filter(|record| !record.is_deleted)
                .ok_or(StoreError::NotFound)?;
            if is_expired(&record, now) {
                return Err(StoreError::Expired);
            }
        }

        self.events
            .entry(code.as_str().to_string())
            .or_default()
            .push((now, event));

        let mut stats = self.stats.entry(code.as_str().to_string()).or_default();
        stats.total_clicks += 1;
        stats.first_access_at.get_or_insert(now);
        stats.last_access_at = Some(now);

        Ok(())
    }

    async fn select_expired(&self, limit: i64) -> Result<Vec<Code>> {
        let now = Timestamp::now().as_second();

        let mut codes: Vec<String> = self
            .urls
            .iter()
            .filter(|entry| {
                !entry.is_deleted
                    && entry
                        .expire_at
                        .is_some_and(|expire_at| expire_at.as_second() < now)
            })
            .map(|entry| entry.key().clone())
            .collect();

        // Deterministic within a scan, matching the SQL backend's ordering.
        codes.sort();
        codes.truncate(limit.max(0) as usize);

        Ok(codes.into_iter().map(Code::new_unchecked).collect())
    }

    async fn bulk_soft_delete(&self, codes: &[Code]) -> Result<()> {
        for code in codes {
            if let Some(mut record) = self.urls.get_mut(code.as_str()) {
                record.is_deleted = true;
            }
        }
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str, page: u32, page_size: u32) -> Result<UrlPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);

        let mut records: Vec<ShortUrl> = self
            .urls
            .iter()
            .filter(|entry| !entry.is_deleted && entry.created_by.as_deref() == Some(owner))
            .map(|entry| entry.clone())
            .collect();

        let total = records.len() as i64;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = ((page - 1) * page_size) as usize;
        let urls = records
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .map(|record| {
                let stats = self
                    .stats
                    .get(record.code.as_str())
                    .map(|stats| stats.clone())
                    .unwrap_or_default();
                UrlMetadata {
                    code: record.code,
                    long_url: record.long_url,
                    created_at: record.created_at,
                    expire_at: record.expire_at,
                    total_clicks: stats.total_clicks,
                    first_access_at: stats.first_access_at,
                    last_access_at: stats.last_access_at,
                }
            })
            .collect();

        Ok(UrlPage {
            urls,
            page,
            page_size,
            total,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;

    fn code(s: &str) -> Code {
        Code::new_unchecked(s)
    }

    fn new_url(c: &str, expire_at: Option<Timestamp>) -> NewShortUrl {
        NewShortUrl {
            code: code(c),
            long_url: format!("https://example.com/{c}"),
            expire_at,
            custom_alias: false,
            created_by: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_monotonic_ids() {
        let store = MemoryStore::new();
        let a = store.create(new_url("aaaa1111", None)).await.unwrap();
        let b = store.create(new_url("bbbb2222", None)).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn create_conflicts_on_duplicate_code() {
        let store = MemoryStore::new();
        store.create(new_url("aaaa1111", None)).await.unwrap();
        let err = store.create(new_url("aaaa1111", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleted_codes_still_conflict() {
        let store = MemoryStore::new();
        store.create(new_url("aaaa1111", None)).await.unwrap();
        store.soft_delete(&code("aaaa1111")).await.unwrap();

        let err = store.create(new_url("aaaa1111", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.exists(&code("aaaa1111")).await.unwrap());
    }

    #[tokio::test]
    async fn get_by_code_observes_expiry_read_only() {
        let store = MemoryStore::new();
        let past = Timestamp::now() - SignedDuration::from_secs(5);
        store.create(new_url("aaaa1111", Some(past))).await.unwrap();

        let err = store.get_by_code(&code("aaaa1111")).await.unwrap_err();
        assert_eq!(err, StoreError::Expired);

        // The row itself is not mutated; the reaper still sees it.
        let expired = store.select_expired(10).await.unwrap();
        assert_eq!(expired, vec![code("aaaa1111")]);
    }

    #[tokio::test]
    async fn soft_delete_is_not_repeatable() {
        let store = MemoryStore::new();
        store.create(new_url("aaaa1111", None)).await.unwrap();

        store.soft_delete(&code("aaaa1111")).await.unwrap();
        let err = store.soft_delete(&code("aaaa1111")).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn record_click_maintains_stats() {
        let store = MemoryStore::new();
        store.create(new_url("aaaa1111", None)).await.unwrap();

        for _ in 0..3 {
            store
                .record_click(&code("aaaa1111"), ClickEvent::default())
                .await
                .unwrap();
        }

        let metadata = store.get_metadata(&code("aaaa1111")).await.unwrap();
        assert_eq!(metadata.total_clicks, 3);
        assert!(metadata.first_access_at.is_some());
        assert!(metadata.last_access_at >= metadata.first_access_at);
        assert_eq!(store.click_count(&code("aaaa1111")), 3);
    }

    #[tokio::test]
    async fn deleted_codes_reject_clicks() {
        let store = MemoryStore::new();
        store.create(new_url("aaaa1111", None)).await.unwrap();
        store.soft_delete(&code("aaaa1111")).await.unwrap();

        let err = store
            .record_click(&code("aaaa1111"), ClickEvent::default())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
        assert_eq!(store.click_count(&code("aaaa1111")), 0);
    }

    #[tokio::test]
    async fn select_expired_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        let past = Timestamp::now() - SignedDuration::from_secs(5);
        store.create(new_url("cccc3333", Some(past))).await.unwrap();
        store.create(new_url("aaaa1111", Some(past))).await.unwrap();
        store.create(new_url("bbbb2222", None)).await.unwrap();

        let expired = store.select_expired(10).await.unwrap();
        assert_eq!(expired, vec![code("aaaa1111"), code("cccc3333")]);

        let limited = store.select_expired(1).await.unwrap();
        assert_eq!(limited, vec![code("aaaa1111")]);
    }

    #[tokio::test]
    async fn bulk_soft_delete_marks_all() {
        let store = MemoryStore::new();
        store.create(new_url("aaaa1111", None)).await.unwrap();
        store.create(new_url("bbbb2222", None)).await.unwrap();

        store
            .bulk_soft_delete(&[code("aaaa1111"), code("bbbb2222")])
            .await
            .unwrap();

        assert!(matches!(
            store.get_by_code(&code("aaaa1111")).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_by_code(&code("bbbb2222")).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_by_owner_pages_live_rows() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut new = new_url(&format!("code000{i}"), None);
            new.created_by = Some("alice".to_string());
            store.create(new).await.unwrap();
        }
        let mut other = new_url("bobs0000", None);
        other.created_by = Some("bob".to_string());
        store.create(other).await.unwrap();

        store.soft_delete(&code("code0004")).await.unwrap();

        let page = store.list_by_owner("alice", 1, 3).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.urls.len(), 3);

        let page = store.list_by_owner("alice", 2, 3).await.unwrap();
        assert_eq!(page.urls.len(), 1);
    }
}
