//! Core types and contracts for the Zipline URL shortener.
//!
//! This crate provides the shared vocabulary used by every other member
//! of the workspace: the validated [`Code`] handle, the base-62
//! time-ordered [`CodeGenerator`], the domain records, and the
//! [`UrlStore`] / [`UrlCache`] capability traits that the storage and
//! cache crates implement.

pub mod base62;
pub mod cache;
pub mod clock;
pub mod code;
pub mod error;
pub mod generator;
pub mod record;
pub mod store;

pub use cache::{effective_ttl, CacheEntry, CacheLookup, CacheStats, UrlCache};
pub use clock::{Clock, SystemClock};
pub use code::Code;
pub use error::{CacheError, Error, Result, ServiceError, StoreError};
pub use generator::{is_valid_code, CodeGenerator};
pub use record::{ClickEvent, NewShortUrl, ShortUrl, UrlMetadata, UrlPage};
pub use store::UrlStore;
