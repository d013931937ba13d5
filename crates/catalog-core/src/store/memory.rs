//! In-memory [`SnapshotStore`] for tests and in-process use.
//!
//! Keeps the last saved [`CatalogData`] behind `std::sync::RwLock`.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::CatalogData;
use crate::snapshot::CatalogSnapshot;

use super::SnapshotStore;

#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<Option<CatalogData>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `data`.
    pub fn with_data(data: CatalogData) -> Self {
        Self {
            data: RwLock::new(Some(data)),
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn save(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        let data = snapshot.to_data();
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(data);
        Ok(())
    }

    async fn load(&self) -> Result<Option<CatalogData>> {
        Ok(self
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
