//! Read-side queries over a [`CatalogSnapshot`].
//!
//! Every answer is computed from one snapshot, so a query never observes a
//! half-applied ingestion. Response types serialize to the JSON shapes the
//! CLI prints with `--json`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CatalogError, Result};
use crate::models::CategoryId;
use crate::search::DEFAULT_SEARCH_LIMIT;
use crate::snapshot::CatalogSnapshot;

/// Bounds applied to incoming queries.
#[derive(Debug, Clone)]
pub struct QueryLimits {
    pub max_per_page: usize,
    pub search_limit: usize,
    /// Minimum length of a trimmed search query, in characters.
    pub min_query_chars: usize,
    /// Joins category names into a path string.
    pub path_separator: String,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_per_page: 500,
            search_limit: DEFAULT_SEARCH_LIMIT,
            min_query_chars: 2,
            path_separator: " > ".to_string(),
        }
    }
}

/// One node of the category tree with its subtree product count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTreeNode {
    pub id: CategoryId,
    pub name: String,
    pub product_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CategoryTreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductItem {
    pub id: String,
    pub article: String,
    pub name: String,
    pub price: f64,
    pub url: Option<String>,
    pub picture: Option<String>,
    /// One root-first path per directly tagged category.
    pub category_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPage {
    pub items: Vec<ProductItem>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
    pub per_page: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResultItem {
    #[serde(flatten)]
    pub product: ProductItem,
    pub score: f64,
    pub matched_terms: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStatistics {
    pub category_count: usize,
    pub product_count: usize,
    pub products_with_image_count: usize,
    pub categories_with_products_count: usize,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Distinct tokens in the search index.
    pub indexed_terms: usize,
    pub snapshot_id: String,
    pub feed_digest: String,
    pub created_at: DateTime<Utc>,
    pub accepted: u64,
    pub skipped: u64,
}

/// Answers read queries against one snapshot.
pub struct QueryService<'a> {
    snapshot: &'a CatalogSnapshot,
    limits: &'a QueryLimits,
}

impl<'a> QueryService<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot, limits: &'a QueryLimits) -> Self {
        Self { snapshot, limits }
    }

    /// The full forest, roots and children in ascending id order.
    pub fn category_tree(&self) -> Vec<CategoryTreeNode> {
        let graph = self.snapshot.graph();
        let aggregates = self.snapshot.aggregates();
        let mut built: Vec<Option<CategoryTreeNode>> = vec![None; graph.len()];
        for i in graph.bottom_up() {
            let children = graph
                .children_at(i)
                .iter()
                .filter_map(|&c| built[c].take())
                .collect();
            let category = graph.category_at(i);
            built[i] = Some(CategoryTreeNode {
                id: category.id,
                name: category.name.clone(),
                product_count: aggregates
                    .get(category.id)
                    .map(|c| c.total_count)
                    .unwrap_or(0),
                children,
            });
        }
        graph
            .root_indices()
            .iter()
            .filter_map(|&r| built[r].take())
            .collect()
    }

    /// Products in the subtree of `category_id`, ordered by product id.
    ///
    /// `page` is 1-based. An unknown category yields an empty page.
    pub fn products_by_category(
        &self,
        category_id: CategoryId,
        page: i64,
        per_page: i64,
    ) -> Result<ProductPage> {
        if page < 1 {
            return Err(CatalogError::invalid_query(format!(
                "page must be >= 1, got {}",
                page
            )));
        }
        if per_page < 1 || per_page as u64 > self.limits.max_per_page as u64 {
            return Err(CatalogError::invalid_query(format!(
                "per_page must be between 1 and {}, got {}",
                self.limits.max_per_page, per_page
            )));
        }
        let page = page as usize;
        let per_page = per_page as usize;

        let aggregates = self.snapshot.aggregates();
        let selected: BTreeSet<usize> = self
            .snapshot
            .graph()
            .descendants(category_id)
            .into_iter()
            .flat_map(|c| aggregates.direct_products(c).iter().copied())
            .collect();

        let total_count = selected.len();
        let items = selected
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .map(|p| self.item(p))
            .collect();

        Ok(ProductPage {
            items,
            total_count,
            total_pages: total_count.div_ceil(per_page),
            page,
            per_page,
        })
    }

    /// Ranked products matching `query`. Queries shorter than the minimum
    /// length return nothing.
    pub fn search(&self, query: &str) -> Vec<SearchResultItem> {
        let query = query.trim();
        if query.chars().count() < self.limits.min_query_chars {
            return Vec::new();
        }
        self.snapshot
            .search_index()
            .query(query, self.limits.search_limit)
            .into_iter()
            .map(|hit| SearchResultItem {
                product: self.item(hit.product),
                score: hit.score,
                matched_terms: hit.matched_terms,
            })
            .collect()
    }

    pub fn statistics(&self) -> CatalogStatistics {
        let products = self.snapshot.products();
        let meta = self.snapshot.meta();

        let (avg_price, min_price, max_price) = if products.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = products.iter().map(|p| p.price).sum();
            let min = products.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
            let max = products.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);
            (sum / products.len() as f64, min, max)
        };

        CatalogStatistics {
            category_count: self.snapshot.graph().len(),
            product_count: products.len(),
            products_with_image_count: products.iter().filter(|p| p.picture().is_some()).count(),
            categories_with_products_count: self.snapshot.aggregates().categories_with_products(),
            avg_price: round2(avg_price),
            min_price: round2(min_price),
            max_price: round2(max_price),
            indexed_terms: self.snapshot.search_index().term_count(),
            snapshot_id: meta.id.clone(),
            feed_digest: meta.feed_digest.clone(),
            created_at: meta.created_at,
            accepted: meta.accepted,
            skipped: meta.skipped,
        }
    }

    fn item(&self, position: usize) -> ProductItem {
        let product = &self.snapshot.products()[position];
        let graph = self.snapshot.graph();
        ProductItem {
            id: product.id.clone(),
            article: product.article.clone(),
            name: product.name.clone(),
            price: product.price,
            url: product.url.clone(),
            picture: product.picture().map(str::to_string),
            category_paths: product
                .direct_category_ids
                .iter()
                .map(|&c| graph.path(c).join(&self.limits.path_separator))
                .collect(),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
