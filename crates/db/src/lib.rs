//! Content persistence for the marketing-site admin surfaces.
//!
//! Exposes the [`ContentStore`](store::ContentStore) capability interface with
//! two interchangeable backends, selected once at startup by configuration:
//! sqlite (sqlx pool, migration-managed schema) and flat-file JSON under a
//! data directory. The HTTP layer depends only on the interface.

pub mod connection;
pub mod migrations;
pub mod store;

pub use connection::{connect, connect_with_settings, DbPool};
pub use store::{
    Collection, ContentRecord, ContentStore, FlatFileContentStore, SqliteContentStore, StoreError,
};
