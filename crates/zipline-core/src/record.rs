use crate::code::Code;
use jiff::Timestamp;

/// The authoritative record of a shortened URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortUrl {
    /// Monotonic row identifier, assigned by the store.
    pub id: i64,
    /// The unique public handle.
    pub code: Code,
    /// The destination URL.
    pub long_url: String,
    /// Server-assigned creation time.
    pub created_at: Timestamp,
    /// Exclusive upper bound on the record's lifetime, if any.
    pub expire_at: Option<Timestamp>,
    /// Soft-delete flag. Transitions false to true, never back.
    pub is_deleted: bool,
    /// Whether the code came from a caller-supplied alias.
    pub custom_alias: bool,
    /// Opaque principal that created the record.
    pub created_by: Option<String>,
    /// Opaque caller-supplied JSON blob.
    pub metadata: Option<String>,
}

impl ShortUrl {
    /// A record is live iff it is not deleted and not past its expiry.
    pub fn is_live(&self, now: Timestamp) -> bool {
        !self.is_deleted && self.expire_at.map_or(true, |expire_at| now < expire_at)
    }
}

/// Fields of a record about to be inserted; `id` and `created_at` are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewShortUrl {
    pub code: Code,
    pub long_url: String,
    pub expire_at: Option<Timestamp>,
    pub custom_alias: bool,
    pub created_by: Option<String>,
    pub metadata: Option<String>,
}

/// An append-only click log entry. The timestamp is assigned by the
/// store at insert time.
#[derive(Debug, Clone, Default)]
pub struct ClickEvent {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub referer: Option<String>,
    pub country: Option<String>,
    pub device_type: Option<String>,
}

/// A record joined with its derived click statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlMetadata {
    pub code: Code,
    pub long_url: String,
    pub created_at: Timestamp,
    pub expire_at: Option<Timestamp>,
    pub total_clicks: i64,
    pub first_access_at: Option<Timestamp>,
    pub last_access_at: Option<Timestamp>,
}

/// One page of an owner's records.
#[derive(Debug, Clone)]
pub struct UrlPage {
    pub urls: Vec<UrlMetadata>,
    pub page: u32,
    pub page_size: u32,
    /// Count of the owner's live rows, across all pages.
    pub total: i64,
}
