//! SQLite-backed [`SnapshotStore`].
//!
//! Saving replaces every catalog row inside one transaction, so readers of
//! the database (and a crash mid-save) see either the previous snapshot or
//! the new one. Loading reads the rows back in id order; derived views are
//! rebuilt by [`CatalogSnapshot::from_data`].

use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use async_trait::async_trait;
use catalog_core::models::{CatalogData, Category, CategoryId, Product, SnapshotMeta};
use catalog_core::store::SnapshotStore;
use catalog_core::{CatalogError, CatalogSnapshot, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::migrate;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an open pool. The schema must already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and create the schema if needed.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool)
            .await
            .context("Failed to prepare catalog schema")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn write(&self, snapshot: &CatalogSnapshot) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM product_categories")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM products").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM categories").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM snapshots").execute(&mut *tx).await?;

        let meta = snapshot.meta();
        sqlx::query(
            "INSERT INTO snapshots (id, feed_digest, created_at, accepted, skipped) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&meta.id)
        .bind(&meta.feed_digest)
        .bind(meta.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .bind(meta.accepted as i64)
        .bind(meta.skipped as i64)
        .execute(&mut *tx)
        .await?;

        for category in snapshot.graph().categories() {
            sqlx::query("INSERT INTO categories (id, name, parent_id, synthetic) VALUES (?, ?, ?, ?)")
                .bind(category.id)
                .bind(&category.name)
                .bind(category.parent_id)
                .bind(category.synthetic)
                .execute(&mut *tx)
                .await?;
        }

        for product in snapshot.products() {
            sqlx::query(
                "INSERT INTO products (id, article, name, price, url, pictures_json) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&product.id)
            .bind(&product.article)
            .bind(&product.name)
            .bind(product.price)
            .bind(&product.url)
            .bind(serde_json::to_string(&product.pictures)?)
            .execute(&mut *tx)
            .await?;

            for &category_id in &product.category_ids {
                sqlx::query(
                    "INSERT INTO product_categories (product_id, category_id, direct) VALUES (?, ?, ?)",
                )
                .bind(&product.id)
                .bind(category_id)
                .bind(product.direct_category_ids.contains(&category_id))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn read(&self) -> anyhow::Result<Option<CatalogData>> {
        let Some(row) = sqlx::query(
            "SELECT id, feed_digest, created_at, accepted, skipped FROM snapshots LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let created_at: String = row.try_get("created_at")?;
        let meta = SnapshotMeta {
            id: row.try_get("id")?,
            feed_digest: row.try_get("feed_digest")?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .with_context(|| format!("Invalid snapshot timestamp: {}", created_at))?
                .with_timezone(&Utc),
            accepted: row.try_get::<i64, _>("accepted")? as u64,
            skipped: row.try_get::<i64, _>("skipped")? as u64,
        };

        let categories = sqlx::query("SELECT id, name, parent_id, synthetic FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| {
                Ok(Category {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    parent_id: row.try_get("parent_id")?,
                    synthetic: row.try_get("synthetic")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        let mut links: HashMap<String, (BTreeSet<CategoryId>, BTreeSet<CategoryId>)> =
            HashMap::new();
        for row in sqlx::query("SELECT product_id, category_id, direct FROM product_categories")
            .fetch_all(&self.pool)
            .await?
        {
            let product_id: String = row.try_get("product_id")?;
            let category_id: CategoryId = row.try_get("category_id")?;
            let direct: bool = row.try_get("direct")?;
            let entry = links.entry(product_id).or_default();
            if direct {
                entry.0.insert(category_id);
            }
            entry.1.insert(category_id);
        }

        let mut products = Vec::new();
        for row in sqlx::query(
            "SELECT id, article, name, price, url, pictures_json FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?
        {
            let id: String = row.try_get("id")?;
            let pictures_json: String = row.try_get("pictures_json")?;
            let (direct_category_ids, category_ids) = links.remove(&id).unwrap_or_default();
            products.push(Product {
                article: row.try_get("article")?,
                name: row.try_get("name")?,
                price: row.try_get("price")?,
                url: row.try_get("url")?,
                pictures: serde_json::from_str(&pictures_json)
                    .with_context(|| format!("Invalid pictures_json for product {}", id))?,
                direct_category_ids,
                category_ids,
                id,
            });
        }

        Ok(Some(CatalogData {
            meta,
            categories,
            products,
        }))
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn save(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        self.write(snapshot).await.map_err(storage_error)?;
        info!(
            snapshot = %snapshot.meta().id,
            products = snapshot.products().len(),
            categories = snapshot.graph().len(),
            "snapshot persisted"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<CatalogData>> {
        self.read().await.map_err(storage_error)
    }
}

fn storage_error(e: anyhow::Error) -> CatalogError {
    CatalogError::storage(format!("{:#}", e))
}
