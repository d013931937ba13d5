//! Per-category product counts.
//!
//! `direct_count` is the number of distinct products tagged with the
//! category itself. `total_count` is the number of distinct products in the
//! subtree. Totals are computed bottom-up by handing each node's product set
//! to its parent and merging the smaller set into the larger one, so a
//! product reachable through several children is counted once. Child counts
//! are never summed.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::graph::CategoryGraph;
use crate::models::{CategoryId, Product};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub direct_count: usize,
    pub total_count: usize,
}

/// Counts for every category plus the direct product index.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    counts: HashMap<CategoryId, CategoryCounts>,
    /// Product positions (into the snapshot's product list) per directly
    /// tagged category, ascending.
    direct_products: HashMap<CategoryId, Vec<usize>>,
}

impl Aggregates {
    /// Compute counts for `graph` over `products`. Only
    /// `direct_category_ids` are read; the closure follows from the graph.
    pub fn compute(graph: &CategoryGraph, products: &[Product]) -> Self {
        let n = graph.len();
        let mut direct: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (position, product) in products.iter().enumerate() {
            for &cid in &product.direct_category_ids {
                if let Some(i) = graph.index_of(cid) {
                    direct[i].push(position);
                }
            }
        }

        let mut handed_up: Vec<Option<HashSet<usize>>> = vec![None; n];
        let mut counts = HashMap::with_capacity(n);
        for i in graph.bottom_up() {
            let mut subtree = handed_up[i].take().unwrap_or_default();
            subtree.extend(direct[i].iter().copied());
            counts.insert(
                graph.id_at(i),
                CategoryCounts {
                    direct_count: direct[i].len(),
                    total_count: subtree.len(),
                },
            );
            if let Some(parent) = graph.parent_at(i) {
                let merged = match handed_up[parent].take() {
                    Some(existing) => union(existing, subtree),
                    None => subtree,
                };
                handed_up[parent] = Some(merged);
            }
        }

        let direct_products = direct
            .into_iter()
            .enumerate()
            .filter(|(_, positions)| !positions.is_empty())
            .map(|(i, positions)| (graph.id_at(i), positions))
            .collect();

        Self {
            counts,
            direct_products,
        }
    }

    /// Counts for `id`; `None` for categories outside the graph.
    pub fn get(&self, id: CategoryId) -> Option<CategoryCounts> {
        self.counts.get(&id).copied()
    }

    pub fn direct_products(&self, id: CategoryId) -> &[usize] {
        self.direct_products
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, CategoryCounts)> + '_ {
        self.counts.iter().map(|(&id, &c)| (id, c))
    }

    /// Categories whose subtree holds at least one product.
    pub fn categories_with_products(&self) -> usize {
        self.counts.values().filter(|c| c.total_count > 0).count()
    }
}

fn union(a: HashSet<usize>, b: HashSet<usize>) -> HashSet<usize> {
    let (mut large, small) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    large.extend(small);
    large
}
