//! Weighted full-text search over product article and name.
//!
//! # Ranking
//!
//! 1. The query is tokenized like the indexed text: lowercased, split on
//!    every non-alphanumeric character. Duplicate terms collapse.
//! 2. A term of two or more characters matches every indexed token it is a
//!    prefix of. One-character terms match only identical tokens.
//! 3. Per product, `score = Σ (article_weight × tf_article + name_weight × tf_name)`
//!    over the matched terms.
//! 4. Sort by matched distinct terms (desc), then distinct terms matched in
//!    the article (desc), then score (desc), then product id (asc). At equal
//!    coverage an article match always outranks a name-only match.
//! 5. Truncate to the limit.
//!
//! Terms combine with OR semantics: a product matching any term is a hit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

use crate::models::Product;

/// Default maximum number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Field weights for ranking. Article matches outrank name matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWeights {
    pub article: f64,
    pub name: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            article: 1.0,
            name: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    product: usize,
    article_tf: u32,
    name_tf: u32,
}

/// A ranked match. `product` is a position in the indexed product slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub product: usize,
    pub matched_terms: usize,
    /// Distinct query terms found in the article.
    pub article_terms: usize,
    pub score: f64,
}

/// Inverted index from token to postings, ordered so prefix lookups are a
/// range scan.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    postings: BTreeMap<String, Vec<Posting>>,
    product_ids: Vec<String>,
    weights: SearchWeights,
}

/// Lowercase `text` and split it on non-alphanumeric characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn term_frequencies(text: &str) -> HashMap<String, u32> {
    let mut tf = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0) += 1;
    }
    tf
}

impl SearchIndex {
    pub fn build(products: &[Product], weights: SearchWeights) -> Self {
        let mut postings: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        for (position, product) in products.iter().enumerate() {
            let article = term_frequencies(&product.article);
            let name = term_frequencies(&product.name);
            let tokens: HashSet<&String> = article.keys().chain(name.keys()).collect();
            for token in tokens {
                postings.entry(token.clone()).or_default().push(Posting {
                    product: position,
                    article_tf: article.get(token).copied().unwrap_or(0),
                    name_tf: name.get(token).copied().unwrap_or(0),
                });
            }
        }
        Self {
            postings,
            product_ids: products.iter().map(|p| p.id.clone()).collect(),
            weights,
        }
    }

    /// Number of distinct indexed tokens.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn query(&self, text: &str, limit: usize) -> Vec<SearchHit> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(text)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        // product -> (matched terms, article terms, score)
        let mut acc: HashMap<usize, (usize, usize, f64)> = HashMap::new();
        for term in &terms {
            let mut per_product: HashMap<usize, (u32, u32)> = HashMap::new();
            for postings in self.matching_postings(term) {
                for p in postings {
                    let e = per_product.entry(p.product).or_insert((0, 0));
                    e.0 += p.article_tf;
                    e.1 += p.name_tf;
                }
            }
            for (product, (article_tf, name_tf)) in per_product {
                let e = acc.entry(product).or_insert((0, 0, 0.0));
                e.0 += 1;
                if article_tf > 0 {
                    e.1 += 1;
                }
                e.2 += self.weights.article * f64::from(article_tf)
                    + self.weights.name * f64::from(name_tf);
            }
        }

        let mut hits: Vec<SearchHit> = acc
            .into_iter()
            .map(|(product, (matched_terms, article_terms, score))| SearchHit {
                product,
                matched_terms,
                article_terms,
                score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.matched_terms
                .cmp(&a.matched_terms)
                .then(b.article_terms.cmp(&a.article_terms))
                .then(
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(self.product_ids[a.product].cmp(&self.product_ids[b.product]))
        });
        hits.truncate(limit);
        hits
    }

    fn matching_postings<'a>(&'a self, term: &'a str) -> Vec<&'a [Posting]> {
        if term.chars().count() < 2 {
            return self
                .postings
                .get(term)
                .map(|p| vec![p.as_slice()])
                .unwrap_or_default();
        }
        self.postings
            .range::<str, _>((Bound::Included(term), Bound::Unbounded))
            .take_while(|(token, _)| token.starts_with(term))
            .map(|(_, p)| p.as_slice())
            .collect()
    }
}
