//! # Catalog Harness Core
//!
//! Shared, I/O-free logic for Catalog Harness: data models, the category
//! graph, record-level feed ingestion, aggregation, search ranking, query
//! answering, and the snapshot store abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem or network access. The
//! application crate supplies feed bytes, parses them into
//! [`models::FeedRecord`]s, and persists snapshots through a
//! [`store::SnapshotStore`] implementation.

pub mod aggregate;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod models;
pub mod query;
pub mod search;
pub mod snapshot;
pub mod store;

pub use error::{CatalogError, Result};
pub use snapshot::CatalogSnapshot;
