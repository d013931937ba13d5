//! Immutable catalog snapshots.
//!
//! A [`CatalogSnapshot`] bundles the category graph, the products, and every
//! derived view (aggregates, search index, product lookup). It is built once,
//! either by ingestion or from persisted [`CatalogData`], and never mutated.
//! Readers share it behind an `Arc` and keep whichever snapshot they started
//! with until they drop it.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::aggregate::Aggregates;
use crate::graph::CategoryGraph;
use crate::ingest::resolve_closure;
use crate::models::{CatalogData, CategoryId, Product, SnapshotMeta};
use crate::search::{SearchIndex, SearchWeights};

#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    meta: SnapshotMeta,
    graph: CategoryGraph,
    /// Sorted by id, ids unique.
    products: Vec<Product>,
    product_index: HashMap<String, usize>,
    aggregates: Aggregates,
    search: SearchIndex,
}

impl CatalogSnapshot {
    /// Assemble a snapshot and compute its derived views. `products` must
    /// already carry resolved category ids; they are re-sorted by id.
    pub fn build(
        meta: SnapshotMeta,
        graph: CategoryGraph,
        mut products: Vec<Product>,
        weights: SearchWeights,
    ) -> Self {
        products.sort_by(|a, b| a.id.cmp(&b.id));
        products.dedup_by(|later, earlier| later.id == earlier.id);
        let product_index = products
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        let aggregates = Aggregates::compute(&graph, &products);
        let search = SearchIndex::build(&products, weights);
        Self {
            meta,
            graph,
            products,
            product_index,
            aggregates,
            search,
        }
    }

    /// The snapshot served before any feed has been ingested.
    pub fn empty() -> Self {
        let data = CatalogData::empty();
        Self::build(
            data.meta,
            CategoryGraph::default(),
            Vec::new(),
            SearchWeights::default(),
        )
    }

    /// Rebuild from persisted records. Category closures are recomputed from
    /// the stored direct tags so the result holds the same invariants as a
    /// freshly ingested snapshot.
    pub fn from_data(data: CatalogData, weights: SearchWeights) -> Self {
        let graph = CategoryGraph::from_categories(data.categories);
        let products = data
            .products
            .into_iter()
            .filter_map(|mut p| {
                let direct: BTreeSet<CategoryId> = p
                    .direct_category_ids
                    .iter()
                    .copied()
                    .filter(|&c| graph.contains(c))
                    .collect();
                let closure = resolve_closure(&graph, &direct);
                if closure.is_empty() {
                    debug!(id = %p.id, "stored product has no resolvable category, dropping");
                    return None;
                }
                p.direct_category_ids = direct;
                p.category_ids = closure;
                Some(p)
            })
            .collect();
        Self::build(data.meta, graph, products, weights)
    }

    /// Authoritative records for persistence.
    pub fn to_data(&self) -> CatalogData {
        CatalogData {
            meta: self.meta.clone(),
            categories: self.graph.categories().cloned().collect(),
            products: self.products.clone(),
        }
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    pub fn graph(&self) -> &CategoryGraph {
        &self.graph
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.product_index.get(id).map(|&i| &self.products[i])
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }
}
