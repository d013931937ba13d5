//! Core data models used throughout Catalog Harness.
//!
//! Raw records ([`RawCategory`], [`RawOffer`]) are what the feed reader
//! produces: every field is an unvalidated string. The ingestion step turns
//! them into validated [`Category`] and [`Product`] values or a
//! [`SkipReason`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// External category key from the feed's `id` attribute.
pub type CategoryId = i64;

/// A node of the category forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Parent after cycle breaking; always resolves to a category in the
    /// same snapshot.
    pub parent_id: Option<CategoryId>,
    /// Placeholder created for a parent that was referenced but never defined.
    pub synthetic: bool,
}

impl Category {
    /// Name given to placeholder categories.
    pub fn placeholder_name(id: CategoryId) -> String {
        format!("Category {}", id)
    }
}

/// A validated product. Immutable within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: String,
    pub article: String,
    pub name: String,
    pub price: f64,
    pub url: Option<String>,
    pub pictures: Vec<String>,
    /// Categories the offer was tagged with that exist in the graph.
    pub direct_category_ids: BTreeSet<CategoryId>,
    /// Direct categories plus all of their ancestors.
    pub category_ids: BTreeSet<CategoryId>,
}

impl Product {
    /// First picture, if any.
    pub fn picture(&self) -> Option<&str> {
        self.pictures.first().map(String::as_str)
    }
}

/// Unvalidated `<category>` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCategory {
    pub id: Option<String>,
    pub parent_id: Option<String>,
    pub name: String,
}

/// Unvalidated `<offer>` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOffer {
    pub id: Option<String>,
    pub name: Option<String>,
    pub price: Option<String>,
    pub url: Option<String>,
    pub vendor_code: Option<String>,
    pub pictures: Vec<String>,
    /// `categoryId` values from both the direct and the nested shape.
    pub category_refs: Vec<String>,
}

/// Top-level feed sections whose presence is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSection {
    Categories,
    Offers,
}

impl FeedSection {
    pub fn element_name(&self) -> &'static str {
        match self {
            FeedSection::Categories => "categories",
            FeedSection::Offers => "offers",
        }
    }
}

/// One item of the record stream a feed reader produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRecord {
    Category(RawCategory),
    Offer(RawOffer),
    /// The closing tag of a required section was reached.
    SectionEnd(FeedSection),
}

/// Why a single record was dropped. Never fatal to an ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InvalidCategoryId,
    InvalidParentId,
    EmptyCategoryName,
    MissingId,
    MissingName,
    MissingPrice,
    InvalidPrice,
    NoCategories,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidCategoryId => "invalid_category_id",
            SkipReason::InvalidParentId => "invalid_parent_id",
            SkipReason::EmptyCategoryName => "empty_category_name",
            SkipReason::MissingId => "missing_id",
            SkipReason::MissingName => "missing_name",
            SkipReason::MissingPrice => "missing_price",
            SkipReason::InvalidPrice => "invalid_price",
            SkipReason::NoCategories => "no_categories",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and provenance of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMeta {
    pub id: String,
    /// SHA-256 hex digest of the feed bytes; empty for the initial snapshot.
    pub feed_digest: String,
    pub created_at: DateTime<Utc>,
    pub accepted: u64,
    pub skipped: u64,
}

impl SnapshotMeta {
    pub fn new(feed_digest: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            feed_digest: feed_digest.into(),
            created_at: Utc::now(),
            accepted: 0,
            skipped: 0,
        }
    }
}

/// The authoritative records of one snapshot, as built by ingestion and as
/// persisted by a [`SnapshotStore`](crate::store::SnapshotStore).
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogData {
    pub meta: SnapshotMeta,
    /// Sorted by id.
    pub categories: Vec<Category>,
    /// Sorted by id, unique ids.
    pub products: Vec<Product>,
}

impl CatalogData {
    pub fn empty() -> Self {
        Self {
            meta: SnapshotMeta::new(""),
            categories: Vec::new(),
            products: Vec::new(),
        }
    }
}
