use thiserror::Error;

/// Type alias for the result type used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

// Centralized error type for the URL shortener, encompassing every layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

/// Outcomes of durable-store operations.
///
/// `NotFound`, `Expired` and `Conflict` describe row state and are part
/// of normal control flow; the remaining variants are backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no live row for code")]
    NotFound,
    #[error("row exists but is past its expiry")]
    Expired,
    #[error("code already bound: {0}")]
    Conflict(String),
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out: {0}")]
    Timeout(String),
    #[error("store query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Whether this outcome is a backend failure rather than a row state.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StoreError::NotFound | StoreError::Expired | StoreError::Conflict(_)
        )
    }
}

/// Failures of the cache tier.
///
/// Every variant is non-authoritative: callers on the lookup path treat
/// a cache error as a miss and fall through to the store.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out: {0}")]
    Timeout(String),
    #[error("cache serialization failed: {0}")]
    Serialization(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
    #[error("cache initialization failed: {0}")]
    Initialization(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// Errors surfaced by the lookup/mutation service.
///
/// These map one-to-one onto the public error contract: the HTTP
/// adapter translates each variant to a status code and an error
/// string without further inspection.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("url exceeds {max} characters")]
    UrlTooLong { max: usize },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("url host is blocked: {0}")]
    UrlBlocked(String),
    #[error("invalid short code: {0}")]
    InvalidCode(String),
    #[error("custom alias already exists: {0}")]
    AliasExists(String),
    #[error("short url not found")]
    NotFound,
    #[error("short url has been deleted")]
    Deleted,
    #[error("short url has expired")]
    Expired,
    #[error("could not allocate a unique code")]
    CodeSpaceExhausted,
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Expired => ServiceError::Expired,
            other => ServiceError::Store(other),
        }
    }
}
