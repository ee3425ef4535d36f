//! The durable-store contract.

use crate::code::Code;
use crate::error::StoreError;
use crate::record::{ClickEvent, NewShortUrl, ShortUrl, UrlMetadata, UrlPage};
use async_trait::async_trait;

/// Type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Capability set of the authoritative store.
///
/// The store exclusively owns the `short_urls`, `click_events` and
/// `click_stats` rows; every read excludes soft-deleted rows.
#[async_trait]
pub trait UrlStore: Send + Sync + 'static {
    /// Inserts a record, assigning `id` and `created_at`.
    ///
    /// Fails with [`StoreError::Conflict`] when the code is already
    /// bound, including to a soft-deleted or expired row.
    async fn create(&self, new: NewShortUrl) -> Result<ShortUrl>;

    /// Fetches the non-deleted row for a code.
    ///
    /// A row past its `expire_at` yields [`StoreError::Expired`] without
    /// being mutated; the reaper performs the writeback.
    async fn get_by_code(&self, code: &Code) -> Result<ShortUrl>;

    /// Fetches the row joined with its click statistics, with the same
    /// delete/expiry semantics as [`get_by_code`](Self::get_by_code).
    async fn get_metadata(&self, code: &Code) -> Result<UrlMetadata>;

    /// Whether any row holds this code, regardless of liveness.
    async fn exists(&self, code: &Code) -> Result<bool>;

    /// Marks the row deleted. Deleting an already-deleted row is
    /// [`StoreError::NotFound`] because reads exclude deleted rows.
    async fn soft_delete(&self, code: &Code) -> Result<()>;

    /// Appends a click event and updates the per-code statistics in the
    /// same transaction. Non-live codes reject new events.
    async fn record_click(&self, code: &Code, event: ClickEvent) -> Result<()>;

    /// Returns up to `limit` codes of live rows past their expiry, in a
    /// deterministic order.
    async fn select_expired(&self, limit: i64) -> Result<Vec<Code>>;

    /// Marks the given rows deleted in a single statement.
    async fn bulk_soft_delete(&self, codes: &[Code]) -> Result<()>;

    /// Lists an owner's live rows, newest first, with the live total.
    async fn list_by_owner(&self, owner: &str, page: u32, page_size: u32) -> Result<UrlPage>;

    /// Checks connectivity to the backend.
    async fn ping(&self) -> Result<()>;
}
