//! Category forest reconstruction.
//!
//! [`CategoryGraphBuilder`] accepts raw `<category>` records in feed order
//! and produces a [`CategoryGraph`]: an arena of nodes indexed by category
//! id. The builder guarantees the result is a forest:
//!
//! 1. Records with a malformed `id` or `parentId` are skipped.
//! 2. Every referenced but undefined parent gets a placeholder node with no
//!    parent, so each `parent_id` resolves.
//! 3. Nodes are visited in ascending id order; a node whose parent chain
//!    leads back to itself loses its parent edge. Each cycle loses exactly
//!    one edge.
//!
//! All traversals are iterative and carry a visited set, so a malformed
//! graph can never recurse or loop forever.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::models::{Category, CategoryId, RawCategory, SkipReason};

#[derive(Debug, Clone)]
struct Node {
    category: Category,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Acyclic, total category forest.
#[derive(Debug, Clone, Default)]
pub struct CategoryGraph {
    nodes: Vec<Node>,
    index: HashMap<CategoryId, usize>,
    roots: Vec<usize>,
    cycles_broken: usize,
}

/// Collects category records and builds a [`CategoryGraph`].
#[derive(Debug, Default)]
pub struct CategoryGraphBuilder {
    records: BTreeMap<CategoryId, Category>,
}

impl CategoryGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add one raw record. A later record with the same id
    /// replaces the earlier one.
    pub fn add_record(&mut self, raw: &RawCategory) -> Result<CategoryId, SkipReason> {
        let id = raw
            .id
            .as_deref()
            .and_then(parse_category_id)
            .ok_or(SkipReason::InvalidCategoryId)?;

        let parent_id = match raw.parent_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(p) => Some(parse_category_id(p).ok_or(SkipReason::InvalidParentId)?),
        };

        let name = raw.name.trim();
        if name.is_empty() {
            return Err(SkipReason::EmptyCategoryName);
        }

        self.add_category(Category {
            id,
            name: name.to_string(),
            parent_id,
            synthetic: false,
        });
        Ok(id)
    }

    /// Add an already-validated category (used when reloading a snapshot).
    pub fn add_category(&mut self, category: Category) {
        if self.records.insert(category.id, category).is_some() {
            debug!("category redefined, keeping the later record");
        }
    }

    /// Number of distinct category ids accepted so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn build(self) -> CategoryGraph {
        let mut categories = self.records;

        // Placeholders for parents that were referenced but never defined.
        let dangling: Vec<CategoryId> = categories
            .values()
            .filter_map(|c| c.parent_id)
            .filter(|p| !categories.contains_key(p))
            .collect();
        for id in dangling {
            if categories.contains_key(&id) {
                continue;
            }
            debug!(category_id = id, "synthesizing placeholder parent category");
            categories.insert(
                id,
                Category {
                    id,
                    name: Category::placeholder_name(id),
                    parent_id: None,
                    synthetic: true,
                },
            );
        }

        let ids: Vec<CategoryId> = categories.keys().copied().collect();
        let mut cycles_broken = 0;
        for id in &ids {
            if closes_cycle(&categories, *id) {
                warn!(category_id = *id, "category parent chain forms a cycle, dropping parent edge");
                if let Some(c) = categories.get_mut(id) {
                    c.parent_id = None;
                }
                cycles_broken += 1;
            }
        }

        let index: HashMap<CategoryId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut nodes: Vec<Node> = categories
            .into_values()
            .map(|category| Node {
                category,
                parent: None,
                children: Vec::new(),
            })
            .collect();

        let mut roots = Vec::new();
        for i in 0..nodes.len() {
            match nodes[i].category.parent_id.and_then(|p| index.get(&p).copied()) {
                Some(p) => {
                    nodes[i].parent = Some(p);
                    nodes[p].children.push(i);
                }
                None => roots.push(i),
            }
        }

        CategoryGraph {
            nodes,
            index,
            roots,
            cycles_broken,
        }
    }
}

/// Parse a category id, tolerating surrounding whitespace.
pub fn parse_category_id(s: &str) -> Option<CategoryId> {
    s.trim().parse::<CategoryId>().ok()
}

/// Walk `start`'s parent chain and report whether it comes back to `start`.
fn closes_cycle(categories: &BTreeMap<CategoryId, Category>, start: CategoryId) -> bool {
    let mut visited = HashSet::new();
    let mut current = categories.get(&start).and_then(|c| c.parent_id);
    while let Some(id) = current {
        if id == start {
            return true;
        }
        if !visited.insert(id) {
            // A cycle further up that does not include `start`.
            return false;
        }
        current = categories.get(&id).and_then(|c| c.parent_id);
    }
    false
}

impl CategoryGraph {
    /// Rebuild a graph from stored categories.
    pub fn from_categories(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut builder = CategoryGraphBuilder::new();
        for c in categories {
            builder.add_category(c);
        }
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.index.get(&id).map(|&i| &self.nodes[i].category)
    }

    /// All categories in ascending id order.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.nodes.iter().map(|n| &n.category)
    }

    pub fn parent(&self, id: CategoryId) -> Option<CategoryId> {
        let i = *self.index.get(&id)?;
        self.nodes[i].parent.map(|p| self.nodes[p].category.id)
    }

    /// Ancestors of `id`, nearest first. Empty for roots and unknown ids.
    pub fn ancestors(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut out = Vec::new();
        let Some(&start) = self.index.get(&id) else {
            return out;
        };
        let mut visited = HashSet::from([start]);
        let mut current = self.nodes[start].parent;
        while let Some(i) = current {
            if !visited.insert(i) {
                break;
            }
            out.push(self.nodes[i].category.id);
            current = self.nodes[i].parent;
        }
        out
    }

    /// Direct children of `id`, ascending.
    pub fn children(&self, id: CategoryId) -> Vec<CategoryId> {
        self.index
            .get(&id)
            .map(|&i| {
                self.nodes[i]
                    .children
                    .iter()
                    .map(|&c| self.nodes[c].category.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subtree closure of `id`: itself first, then all descendants in
    /// pre-order. Empty for unknown ids.
    pub fn descendants(&self, id: CategoryId) -> Vec<CategoryId> {
        match self.index.get(&id) {
            Some(&i) => self
                .preorder_from(&[i])
                .into_iter()
                .map(|n| self.nodes[n].category.id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Root category ids, ascending.
    pub fn roots(&self) -> impl Iterator<Item = CategoryId> + '_ {
        self.roots.iter().map(|&i| self.nodes[i].category.id)
    }

    /// Names from the root down to `id`.
    pub fn path(&self, id: CategoryId) -> Vec<&str> {
        let Some(category) = self.get(id) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .ancestors(id)
            .into_iter()
            .filter_map(|a| self.get(a).map(|c| c.name.as_str()))
            .collect();
        names.reverse();
        names.push(category.name.as_str());
        names
    }

    /// Number of parent edges dropped to make the graph acyclic.
    pub fn cycles_broken(&self) -> usize {
        self.cycles_broken
    }

    /// Number of placeholder categories.
    pub fn synthesized(&self) -> usize {
        self.nodes.iter().filter(|n| n.category.synthetic).count()
    }

    pub(crate) fn index_of(&self, id: CategoryId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub(crate) fn id_at(&self, i: usize) -> CategoryId {
        self.nodes[i].category.id
    }

    pub(crate) fn category_at(&self, i: usize) -> &Category {
        &self.nodes[i].category
    }

    pub(crate) fn parent_at(&self, i: usize) -> Option<usize> {
        self.nodes[i].parent
    }

    pub(crate) fn children_at(&self, i: usize) -> &[usize] {
        &self.nodes[i].children
    }

    pub(crate) fn root_indices(&self) -> &[usize] {
        &self.roots
    }

    /// Every node, each one after all of its descendants.
    pub(crate) fn bottom_up(&self) -> Vec<usize> {
        let mut order = self.preorder_from(&self.roots);
        order.reverse();
        order
    }

    fn preorder_from(&self, starts: &[usize]) -> Vec<usize> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = starts.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            stack.extend(self.nodes[i].children.iter().rev().copied());
        }
        order
    }
}
