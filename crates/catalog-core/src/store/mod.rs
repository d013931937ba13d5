//! Storage abstraction for catalog snapshots.
//!
//! A [`SnapshotStore`] holds at most one snapshot: the last one that was
//! published. `save` must replace the stored snapshot as a single unit, so a
//! failure part-way leaves the previous snapshot in place.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::CatalogData;
use crate::snapshot::CatalogSnapshot;

/// Persistence backend for published snapshots.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save`](SnapshotStore::save) | Atomically replace the stored snapshot |
/// | [`load`](SnapshotStore::load) | Read back the stored snapshot, if any |
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot with `snapshot`.
    async fn save(&self, snapshot: &CatalogSnapshot) -> Result<()>;

    /// The stored snapshot's records, or `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<CatalogData>>;
}
