//! Orchestration layer for Zipline.
//!
//! [`LinkService`] coordinates the code generator, the durable store
//! and the cache tier to implement create, resolve, delete, metadata
//! and expiry-cleanup flows. [`Reaper`] drives the cleanup flow on a
//! timer.

pub mod reaper;
pub mod service;

pub use reaper::Reaper;
pub use service::{
    ClickHints, CreateRequest, CreatedUrl, HealthStatus, LinkService, ResolvedUrl, ServiceConfig,
};
