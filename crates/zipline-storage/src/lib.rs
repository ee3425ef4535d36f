//! Durable-store implementations for Zipline.
//!
//! [`PostgresStore`] is the production backend; [`MemoryStore`] backs
//! tests and local development with the same observable semantics.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
