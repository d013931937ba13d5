//! The catalog service: one published snapshot, one writer at a time.
//!
//! # Ingestion
//!
//! 1. Take the ingestion lock without waiting. If another run holds it the
//!    call fails with [`CatalogError::ConcurrentIngestion`].
//! 2. Fetch the feed bytes from its [`FeedSource`].
//! 3. Stream the XML through [`FeedReader`] into the core
//!    [`FeedIngestor`], which builds a complete [`CatalogSnapshot`] off to
//!    the side.
//! 4. Persist the snapshot through the [`SnapshotStore`].
//! 5. Publish it with a single `Arc` swap.
//!
//! Any failure before step 5 leaves the published snapshot untouched.
//!
//! # Queries
//!
//! Each query clones the current `Arc<CatalogSnapshot>` (the lock is held
//! only for the clone) and answers from that snapshot, so it never sees a
//! half-applied ingestion.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use catalog_core::ingest::{FeedIngestor, IngestOptions, IngestReport};
use catalog_core::models::CategoryId;
use catalog_core::query::{
    CatalogStatistics, CategoryTreeNode, ProductPage, QueryLimits, QueryService, SearchResultItem,
};
use catalog_core::store::SnapshotStore;
use catalog_core::{CatalogError, CatalogSnapshot, Result};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::config::Config;
use crate::feed::{feed_digest, FeedReader, FeedSource};
use crate::progress::IngestProgressReporter;
use crate::sqlite_store::SqliteStore;

/// Tuning for a [`Catalog`], decoupled from the TOML config.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub ingest: IngestOptions,
    pub limits: QueryLimits,
    pub fetch_timeout: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            ingest: IngestOptions::default(),
            limits: QueryLimits::default(),
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

impl CatalogSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ingest: config.ingest_options(),
            limits: config.query_limits(),
            fetch_timeout: Duration::from_secs(config.feed.timeout_secs),
        }
    }
}

pub struct Catalog<S: SnapshotStore> {
    store: S,
    settings: CatalogSettings,
    current: RwLock<Arc<CatalogSnapshot>>,
    ingest_lock: Mutex<()>,
}

/// Exclusive right to run one ingestion. Obtained from
/// [`Catalog::begin_ingest`]; released on drop.
pub struct IngestPermit<'a, S: SnapshotStore> {
    catalog: &'a Catalog<S>,
    _guard: MutexGuard<'a, ()>,
}

impl<S: SnapshotStore> Catalog<S> {
    /// Open the catalog, publishing whatever snapshot `store` holds (or an
    /// empty one).
    pub async fn open(store: S, settings: CatalogSettings) -> Result<Self> {
        let snapshot = match store.load().await? {
            Some(data) => {
                let snapshot =
                    CatalogSnapshot::from_data(data, settings.ingest.search_weights);
                info!(
                    snapshot = %snapshot.meta().id,
                    products = snapshot.products().len(),
                    "loaded persisted snapshot"
                );
                snapshot
            }
            None => CatalogSnapshot::empty(),
        };
        Ok(Self {
            store,
            settings,
            current: RwLock::new(Arc::new(snapshot)),
            ingest_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the ingestion lock without waiting.
    pub fn begin_ingest(&self) -> Result<IngestPermit<'_, S>> {
        let guard = self
            .ingest_lock
            .try_lock()
            .map_err(|_| CatalogError::ConcurrentIngestion)?;
        Ok(IngestPermit {
            catalog: self,
            _guard: guard,
        })
    }

    /// Fetch, parse, persist and publish the feed at `source`.
    pub async fn ingest(
        &self,
        source: &FeedSource,
        reporter: &dyn IngestProgressReporter,
    ) -> Result<IngestReport> {
        self.begin_ingest()?.ingest(source, reporter).await
    }

    /// Ingest a feed that is already in memory.
    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        reporter: &dyn IngestProgressReporter,
    ) -> Result<IngestReport> {
        self.begin_ingest()?.ingest_bytes(bytes, reporter).await
    }

    pub fn category_tree(&self) -> Vec<CategoryTreeNode> {
        let snapshot = self.snapshot();
        QueryService::new(&snapshot, &self.settings.limits).category_tree()
    }

    pub fn products_by_category(
        &self,
        category_id: CategoryId,
        page: i64,
        per_page: i64,
    ) -> Result<ProductPage> {
        let snapshot = self.snapshot();
        QueryService::new(&snapshot, &self.settings.limits).products_by_category(
            category_id,
            page,
            per_page,
        )
    }

    pub fn search(&self, query: &str) -> Vec<SearchResultItem> {
        let snapshot = self.snapshot();
        QueryService::new(&snapshot, &self.settings.limits).search(query)
    }

    pub fn statistics(&self) -> CatalogStatistics {
        let snapshot = self.snapshot();
        QueryService::new(&snapshot, &self.settings.limits).statistics()
    }

    fn publish(&self, snapshot: CatalogSnapshot) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }
}

impl<S: SnapshotStore> IngestPermit<'_, S> {
    pub async fn ingest(
        self,
        source: &FeedSource,
        reporter: &dyn IngestProgressReporter,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        info!(%source, "ingesting feed");
        let bytes = source.fetch(self.catalog.settings.fetch_timeout).await?;
        self.run(&bytes, reporter, started).await
    }

    pub async fn ingest_bytes(
        self,
        bytes: &[u8],
        reporter: &dyn IngestProgressReporter,
    ) -> Result<IngestReport> {
        self.run(bytes, reporter, Instant::now()).await
    }

    async fn run(
        self,
        bytes: &[u8],
        reporter: &dyn IngestProgressReporter,
        started: Instant,
    ) -> Result<IngestReport> {
        let catalog = self.catalog;
        let digest = feed_digest(bytes);
        let (snapshot, mut report) = FeedIngestor::new(catalog.settings.ingest.clone())
            .with_progress(|event| reporter.report(event))
            .run(FeedReader::new(bytes), &digest)?;

        catalog.store.save(&snapshot).await?;
        catalog.publish(snapshot);

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            snapshot = %report.snapshot_id,
            accepted = report.accepted,
            skipped = report.skipped,
            duration_ms = report.duration_ms,
            "snapshot published"
        );
        Ok(report)
    }
}

/// Open the SQLite-backed catalog described by `config`.
pub async fn open_catalog(config: &Config) -> anyhow::Result<Catalog<SqliteStore>> {
    let store = SqliteStore::connect(config).await?;
    let catalog = Catalog::open(store, CatalogSettings::from_config(config)).await?;
    Ok(catalog)
}
