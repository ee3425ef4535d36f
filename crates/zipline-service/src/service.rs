use jiff::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;
use url::Url;
use zipline_core::{
    is_valid_code, CacheEntry, CacheLookup, ClickEvent, Code, CodeGenerator, NewShortUrl,
    ServiceError, ShortUrl, StoreError, UrlCache, UrlMetadata, UrlPage, UrlStore,
};

/// Attempts at minting a fresh code before giving up. Each retry is a
/// generator-collision event, which the entropy bits make vanishingly
/// rare; exhaustion indicates a misconfigured code length.
const GENERATE_ATTEMPTS: usize = 10;

/// Deadline for the detached click record after a cache hit. The task
/// runs on its own context so a client disconnect cannot cancel
/// analytics.
const CLICK_DEADLINE: Duration = Duration::from_secs(5);

/// Rows reconciled per cleanup batch.
const REAP_BATCH_SIZE: i64 = 100;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Tunables of the lookup/mutation service.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceConfig {
    /// Public base URL used when rendering short links.
    #[builder(setter(into))]
    pub base_url: String,
    /// Length of generated codes.
    #[builder(default = zipline_core::generator::DEFAULT_CODE_LENGTH)]
    pub code_length: usize,
    /// Upper bound on accepted destination URLs.
    #[builder(default = 2048)]
    pub max_url_length: usize,
    /// When non-empty, a destination host must substring-match one entry.
    #[builder(default)]
    pub allowed_hosts: Vec<String>,
    /// A destination host must not substring-match any entry.
    #[builder(default)]
    pub blocked_hosts: Vec<String>,
}

/// Inputs of [`LinkService::create`].
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub long_url: String,
    pub custom_alias: Option<String>,
    pub expire_at: Option<Timestamp>,
    pub created_by: Option<String>,
    pub metadata: Option<String>,
}

/// The public view of a freshly created record.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedUrl {
    pub code: Code,
    pub short_url: String,
    pub long_url: String,
    pub expire_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// The snapshot a resolve returns; callers re-enter the service for
/// fresh reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUrl {
    pub code: Code,
    pub long_url: String,
    pub created_at: Timestamp,
    pub expire_at: Option<Timestamp>,
}

/// Analytics hints extracted by the adapter from the inbound request.
#[derive(Debug, Clone, Default)]
pub struct ClickHints {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub referer: Option<String>,
}

/// Connectivity of the service's collaborators, for health reporting.
#[derive(Debug, Clone, Copy)]
pub struct HealthStatus {
    pub store_ok: bool,
    pub cache_ok: bool,
}

/// The lookup/mutation service.
///
/// Orchestrates the generator, store and cache. Cache failures are
/// downgraded to misses throughout: tier unavailability degrades
/// latency, never correctness.
pub struct LinkService<S, C> {
    store: Arc<S>,
    cache: Arc<C>,
    generator: Arc<CodeGenerator>,
    config: ServiceConfig,
}

impl<S, C> Clone for LinkService<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
        }
    }
}

impl<S: UrlStore, C: UrlCache> LinkService<S, C> {
    /// Creates a service over the given collaborators.
    pub fn new(store: S, cache: C, config: ServiceConfig) -> Self {
        let generator = Arc::new(CodeGenerator::new(config.code_length));
        Self {
            store: Arc::new(store),
            cache: Arc::new(cache),
            generator,
            config,
        }
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a reference to the cache tier.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Creates a short URL.
    ///
    /// Custom aliases are normalized by the generator and must not be
    /// bound yet. Generated codes retry on collision, both against the
    /// exists-probe and against the store's unique constraint (which is
    /// what settles cross-process races).
    pub async fn create(&self, request: CreateRequest) -> Result<CreatedUrl> {
        self.validate_url(&request.long_url)?;

        let record = match request.custom_alias.as_deref().filter(|a| !a.is_empty()) {
            Some(alias) => {
                let code = self.generator.derive(alias);
                if self.code_exists(&code).await? {
                    return Err(ServiceError::AliasExists(code.to_string()));
                }

                match self.insert(&request, code.clone(), true).await {
                    Ok(record) => record,
                    // Lost the race to another writer holding the same alias.
                    Err(StoreError::Conflict(_)) => {
                        return Err(ServiceError::AliasExists(code.to_string()));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            None => self.create_generated(&request).await?,
        };

        // Warm the cache; failure costs one store round trip later.
        if let Err(e) = self.cache.set(&record.code, &CacheEntry::positive(&record)).await {
            warn!(code = %record.code, error = %e, "failed to warm cache after create");
        }

        Ok(CreatedUrl {
            short_url: record.code.to_url(&self.config.base_url),
            code: record.code,
            long_url: record.long_url,
            expire_at: record.expire_at,
            created_at: record.created_at,
        })
    }

    async fn create_generated(&self, request: &CreateRequest) -> std::result::Result<ShortUrl, ServiceError> {
        for attempt in 1..=GENERATE_ATTEMPTS {
            let code = self.generator.generate();
            if self.code_exists(&code).await? {
                debug!(code = %code, attempt, "generated code already bound, retrying");
                continue;
            }

            match self.insert(request, code, false).await {
                Ok(record) => return Ok(record),
                Err(StoreError::Conflict(code)) => {
                    // Generator collision surfaced by the unique index.
                    debug!(code = %code, attempt, "insert conflict on generated code, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ServiceError::CodeSpaceExhausted)
    }

    async fn insert(
        &self,
        request: &CreateRequest,
        code: Code,
        custom_alias: bool,
    ) -> std::result::Result<ShortUrl, StoreError> {
        self.store
            .create(NewShortUrl {
                code,
                long_url: request.long_url.clone(),
                expire_at: request.expire_at,
                custom_alias,
                created_by: request.created_by.clone(),
                metadata: request.metadata.clone(),
            })
            .await
    }

    /// Resolves a code to its destination. The redirect hot path.
    ///
    /// A cache hit completes without waiting for the click write; the
    /// click runs on a detached task with its own deadline. Negative
    /// cache outcomes do not fall through to the store.
    pub async fn resolve(&self, code: &str, hints: ClickHints) -> Result<ResolvedUrl> {
        // A malformed code cannot name a record; skip both tiers.
        if !is_valid_code(code) {
            return Err(ServiceError::NotFound);
        }
        let code = Code::new_unchecked(code);

        match self.cache.get(&code).await {
            Ok(CacheLookup::Hit(entry)) => {
                if let Some(long_url) = entry.long_url {
                    self.spawn_click(code.clone(), hints);
                    return Ok(ResolvedUrl {
                        code,
                        long_url,
                        created_at: entry.created_at,
                        expire_at: entry.expire_at,
                    });
                }
                // A live entry without a destination is corrupt; treat
                // as a miss and let the store answer.
                warn!(code = %code, "cached entry has no destination, falling through");
            }
            Ok(CacheLookup::Deleted) => return Err(ServiceError::Deleted),
            Ok(CacheLookup::Expired) => return Err(ServiceError::Expired),
            Ok(CacheLookup::Miss) => trace!(code = %code, "cache miss"),
            Err(e) => {
                // Non-authoritative tier: degrade to a miss.
                warn!(code = %code, error = %e, "cache error on resolve, falling back to store");
            }
        }

        match self.store.get_by_code(&code).await {
            Ok(record) => {
                if let Err(e) = self.cache.set(&code, &CacheEntry::positive(&record)).await {
                    warn!(code = %code, error = %e, "failed to cache record");
                }

                // Synchronous best effort: the caller never sees click
                // failures, they are only logged.
                if let Err(e) = self.store.record_click(&code, click_event(&hints)).await {
                    warn!(code = %code, error = %e, "failed to record click");
                }

                Ok(ResolvedUrl {
                    code: record.code,
                    long_url: record.long_url,
                    created_at: record.created_at,
                    expire_at: record.expire_at,
                })
            }
            Err(StoreError::NotFound) => {
                if let Err(e) = self.cache.set_negative(&code).await {
                    warn!(code = %code, error = %e, "failed to set negative cache entry");
                }
                Err(ServiceError::NotFound)
            }
            // Do not warm the cache: the reaper will tombstone soon.
            Err(StoreError::Expired) => Err(ServiceError::Expired),
            Err(err) => Err(ServiceError::Store(err)),
        }
    }

    /// Fetches a record joined with its click statistics.
    pub async fn metadata(&self, code: &str) -> Result<UrlMetadata> {
        if !is_valid_code(code) {
            return Err(ServiceError::NotFound);
        }
        let code = Code::new_unchecked(code);

        let cache_fresh = matches!(self.cache.get(&code).await, Ok(CacheLookup::Hit(_)));

        let metadata = self.store.get_metadata(&code).await.map_err(ServiceError::from)?;

        if !cache_fresh {
            let entry = CacheEntry {
                long_url: Some(metadata.long_url.clone()),
                expire_at: metadata.expire_at,
                is_deleted: false,
                created_at: metadata.created_at,
            };
            if let Err(e) = self.cache.set(&code, &entry).await {
                warn!(code = %code, error = %e, "failed to warm cache from metadata");
            }
        }

        Ok(metadata)
    }

    /// Soft-deletes a record and invalidates its cache entry.
    ///
    /// Deleting an already-deleted code is `NotFound`. A cache failure
    /// after the store committed is recoverable: the entry converges by
    /// TTL expiry.
    pub async fn delete(&self, code: &str) -> Result<Code> {
        if !is_valid_code(code) {
            return Err(ServiceError::NotFound);
        }
        let code = Code::new_unchecked(code);

        self.store.soft_delete(&code).await.map_err(ServiceError::from)?;

        if let Err(e) = self.cache.delete(&code).await {
            warn!(code = %code, error = %e, "failed to invalidate cache after delete");
        }

        Ok(code)
    }

    /// Reconciles one batch of expired rows to the soft-deleted state.
    ///
    /// Returns the number of rows reconciled. Invoked by the reaper and
    /// by the admin trigger.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let codes = self
            .store
            .select_expired(REAP_BATCH_SIZE)
            .await
            .map_err(ServiceError::from)?;

        if codes.is_empty() {
            return Ok(0);
        }

        self.store
            .bulk_soft_delete(&codes)
            .await
            .map_err(ServiceError::from)?;

        // Stale entries self-expire via TTL if this fails.
        if let Err(e) = self.cache.invalidate_many(&codes).await {
            warn!(count = codes.len(), error = %e, "failed to invalidate expired cache entries");
        }

        debug!(count = codes.len(), "reconciled expired rows");
        Ok(codes.len())
    }

    /// Lists an owner's live records, newest first.
    pub async fn list_by_owner(&self, owner: &str, page: u32, page_size: u32) -> Result<UrlPage> {
        self.store
            .list_by_owner(owner, page, page_size)
            .await
            .map_err(ServiceError::from)
    }

    /// Probes both collaborators.
    pub async fn health(&self) -> HealthStatus {
        HealthStatus {
            store_ok: self.store.ping().await.is_ok(),
            cache_ok: self.cache.ping().await.is_ok(),
        }
    }

    /// Whether any row holds this code, probing the cache first.
    ///
    /// A present cache entry proves the code is bound even when the
    /// record is expired; a tombstone proves nothing (the code may
    /// simply be unknown), so it falls through to the store.
    async fn code_exists(&self, code: &Code) -> Result<bool> {
        match self.cache.get(code).await {
            Ok(CacheLookup::Hit(_)) | Ok(CacheLookup::Expired) => return Ok(true),
            Ok(CacheLookup::Miss) | Ok(CacheLookup::Deleted) => {}
            Err(e) => {
                warn!(code = %code, error = %e, "cache error on exists probe");
            }
        }

        self.store.exists(code).await.map_err(ServiceError::from)
    }

    fn spawn_click(&self, code: Code, hints: ClickHints) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let result =
                tokio::time::timeout(CLICK_DEADLINE, store.record_click(&code, click_event(&hints)))
                    .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(code = %code, error = %e, "detached click record failed"),
                Err(_) => warn!(code = %code, "detached click record timed out"),
            }
        });
    }

    fn validate_url(&self, long_url: &str) -> Result<()> {
        if long_url.len() > self.config.max_url_length {
            return Err(ServiceError::UrlTooLong {
                max: self.config.max_url_length,
            });
        }

        let parsed = Url::parse(long_url)
            .map_err(|e| ServiceError::InvalidUrl(format!("{long_url}: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ServiceError::InvalidUrl(format!(
                "only http and https URLs are allowed, got '{}'",
                parsed.scheme()
            )));
        }

        let Some(host) = parsed.host_str().filter(|host| !host.is_empty()) else {
            return Err(ServiceError::InvalidUrl(
                "URL must have a valid host".to_string(),
            ));
        };

        if self.config.blocked_hosts.iter().any(|blocked| host.contains(blocked.as_str())) {
            return Err(ServiceError::UrlBlocked(host.to_string()));
        }

        if !self.config.allowed_hosts.is_empty()
            && !self
                .config
                .allowed_hosts
                .iter()
                .any(|allowed| host.contains(allowed.as_str()))
        {
            return Err(ServiceError::UrlBlocked(host.to_string()));
        }

        Ok(())
    }
}

fn click_event(hints: &ClickHints) -> ClickEvent {
    ClickEvent {
        user_agent: hints.user_agent.clone(),
        ip_address: hints.ip_address.clone(),
        referer: hints.referer.clone(),
        country: None,
        device_type: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use zipline_cache::MemoryCache;
    use zipline_storage::MemoryStore;

    fn config() -> ServiceConfig {
        ServiceConfig::builder()
            .base_url("http://localhost:8080")
            .blocked_hosts(vec!["badness.example".to_string()])
            .build()
    }

    fn service() -> LinkService<MemoryStore, MemoryCache> {
        LinkService::new(
            MemoryStore::new(),
            MemoryCache::new(Duration::from_secs(86_400), Duration::from_secs(300)),
            config(),
        )
    }

    fn create_request(url: &str) -> CreateRequest {
        CreateRequest {
            long_url: url.to_string(),
            custom_alias: None,
            expire_at: None,
            created_by: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn create_returns_generated_code_and_short_url() {
        let service = service();
        let created = service
            .create(create_request("https://example.com/a"))
            .await
            .unwrap();

        assert_eq!(created.code.as_str().len(), 8);
        assert_eq!(
            created.short_url,
            format!("http://localhost:8080/{}", created.code)
        );
        assert_eq!(created.long_url, "https://example.com/a");
    }

    #[tokio::test]
    async fn create_rejects_overlong_urls() {
        let service = service();
        let long = format!("https://example.com/{}", "a".repeat(2048));
        let err = service.create(create_request(&long)).await.unwrap_err();
        assert!(matches!(err, ServiceError::UrlTooLong { .. }));
    }

    #[tokio::test]
    async fn create_rejects_bad_urls() {
        let service = service();
        for url in ["not a url", "ftp://example.com/a", "https://"] {
            let err = service.create(create_request(url)).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidUrl(_)), "url: {url}");
        }
    }

    #[tokio::test]
    async fn create_rejects_blocked_hosts() {
        let service = service();
        let err = service
            .create(create_request("https://x.badness.example/p"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UrlBlocked(_)));
    }

    #[tokio::test]
    async fn allowed_hosts_gate_when_configured() {
        let config = ServiceConfig::builder()
            .base_url("http://localhost:8080")
            .allowed_hosts(vec!["example.com".to_string()])
            .build();
        let service = LinkService::new(
            MemoryStore::new(),
            MemoryCache::new(Duration::from_secs(86_400), Duration::from_secs(300)),
            config,
        );

        assert!(service
            .create(create_request("https://www.example.com/ok"))
            .await
            .is_ok());
        let err = service
            .create(create_request("https://elsewhere.net/no"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UrlBlocked(_)));
    }

    #[tokio::test]
    async fn custom_alias_is_normalized_and_conflicts_surface() {
        let service = service();
        let mut request = create_request("https://a.example/1");
        request.custom_alias = Some("promo2024".to_string());

        let created = service.create(request.clone()).await.unwrap();
        // Normalized to the configured code length.
        assert_eq!(created.code.as_str(), "promo202");

        request.long_url = "https://a.example/2".to_string();
        let err = service.create(request).await.unwrap_err();
        assert!(matches!(err, ServiceError::AliasExists(_)));
    }

    #[tokio::test]
    async fn round_trip_resolves_to_the_original_url() {
        let service = service();
        let created = service
            .create(create_request("https://example.com/a"))
            .await
            .unwrap();

        let resolved = service
            .resolve(created.code.as_str(), ClickHints::default())
            .await
            .unwrap();
        assert_eq!(resolved.long_url, "https://example.com/a");
    }

    #[tokio::test]
    async fn resolve_unknown_code_is_not_found() {
        let service = service();
        let err = service
            .resolve("zzzz9999", ClickHints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn resolve_malformed_code_skips_both_tiers() {
        let service = service();
        let err = service
            .resolve("no spaces!", ClickHints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn delete_then_delete_again_is_not_found() {
        let service = service();
        let created = service
            .create(create_request("https://example.com/a"))
            .await
            .unwrap();

        service.delete(created.code.as_str()).await.unwrap();
        let err = service.delete(created.code.as_str()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn metadata_includes_click_stats() {
        let service = service();
        let created = service
            .create(create_request("https://example.com/a"))
            .await
            .unwrap();

        // Force the store path so the click is recorded synchronously.
        service.cache().delete(&created.code).await.unwrap();
        service
            .resolve(created.code.as_str(), ClickHints::default())
            .await
            .unwrap();

        let metadata = service.metadata(created.code.as_str()).await.unwrap();
        assert_eq!(metadata.total_clicks, 1);
        assert_eq!(metadata.long_url, "https://example.com/a");
    }
}
