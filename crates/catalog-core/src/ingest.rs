//! Record-level feed ingestion.
//!
//! [`FeedIngestor`] consumes the [`FeedRecord`] stream a feed reader
//! produces and turns it into a fresh [`CatalogSnapshot`]:
//!
//! 1. `<category>` records go to the [`CategoryGraphBuilder`]. The graph is
//!    built when the categories section closes.
//! 2. Each `<offer>` is validated into a [`Product`] or a [`SkipReason`].
//!    Offers that arrive before the graph exists are held back and resolved
//!    once it does.
//! 3. A product's category closure is its resolved direct tags plus every
//!    ancestor of each. Unknown category ids are dropped; an empty closure
//!    skips the product.
//! 4. A later offer with the same id replaces the earlier product.
//!
//! Nothing here touches shared state. The caller publishes the returned
//! snapshot only when the whole run succeeded.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::graph::{parse_category_id, CategoryGraph, CategoryGraphBuilder};
use crate::models::{
    CategoryId, FeedRecord, FeedSection, Product, RawOffer, SkipReason, SnapshotMeta,
};
use crate::search::SearchWeights;
use crate::snapshot::CatalogSnapshot;

/// Tuning for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Emit an [`IngestProgress::Offers`] event every this many offers.
    pub progress_every: u64,
    pub search_weights: SearchWeights,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            progress_every: 1000,
            search_weights: SearchWeights::default(),
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProgress {
    /// The categories section was closed and the graph built.
    CategoriesBuilt {
        categories: usize,
        synthesized: usize,
        skipped: u64,
    },
    /// Periodic offer counters.
    Offers { accepted: u64, skipped: u64 },
    /// All records consumed.
    Finished {
        accepted: u64,
        skipped: u64,
        products: usize,
    },
}

/// Counters describing one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub snapshot_id: String,
    pub feed_digest: String,
    /// Offer records accepted (duplicates included).
    pub accepted: u64,
    /// Offer records skipped.
    pub skipped: u64,
    /// Categories in the graph, placeholders included.
    pub categories: usize,
    pub synthesized_categories: usize,
    pub skipped_categories: u64,
    pub cycles_broken: usize,
    /// Distinct products in the snapshot.
    pub products: usize,
    pub skip_reasons: BTreeMap<SkipReason, u64>,
    pub duration_ms: u64,
}

impl IngestReport {
    fn record_skip(&mut self, reason: SkipReason) {
        *self.skip_reasons.entry(reason).or_insert(0) += 1;
    }
}

/// Streaming state machine over [`FeedRecord`]s.
pub struct FeedIngestor<'p> {
    options: IngestOptions,
    builder: CategoryGraphBuilder,
    graph: Option<CategoryGraph>,
    pending: Vec<RawOffer>,
    products: BTreeMap<String, Product>,
    offers_closed: bool,
    report: IngestReport,
    progress: Box<dyn FnMut(IngestProgress) + 'p>,
}

impl<'p> FeedIngestor<'p> {
    pub fn new(options: IngestOptions) -> Self {
        Self {
            options,
            builder: CategoryGraphBuilder::new(),
            graph: None,
            pending: Vec::new(),
            products: BTreeMap::new(),
            offers_closed: false,
            report: IngestReport::default(),
            progress: Box::new(|_| {}),
        }
    }

    pub fn with_progress(mut self, progress: impl FnMut(IngestProgress) + 'p) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Consume a whole record stream and finish.
    pub fn run<I>(mut self, records: I, feed_digest: &str) -> Result<(CatalogSnapshot, IngestReport)>
    where
        I: IntoIterator<Item = Result<FeedRecord>>,
    {
        for record in records {
            self.push(record?);
        }
        self.finish(feed_digest)
    }

    pub fn push(&mut self, record: FeedRecord) {
        match record {
            FeedRecord::Category(raw) => {
                if self.graph.is_some() {
                    warn!(id = ?raw.id, "category after the categories section, ignoring");
                    self.report.skipped_categories += 1;
                    return;
                }
                if let Err(reason) = self.builder.add_record(&raw) {
                    warn!(id = ?raw.id, %reason, "skipping category record");
                    self.report.skipped_categories += 1;
                    self.report.record_skip(reason);
                }
            }
            FeedRecord::SectionEnd(FeedSection::Categories) => {
                if self.graph.is_none() {
                    self.build_graph();
                }
            }
            FeedRecord::Offer(raw) => {
                if self.graph.is_some() {
                    self.accept_offer(raw);
                } else {
                    self.pending.push(raw);
                }
            }
            FeedRecord::SectionEnd(FeedSection::Offers) => {
                self.offers_closed = true;
            }
        }
    }

    pub fn finish(mut self, feed_digest: &str) -> Result<(CatalogSnapshot, IngestReport)> {
        let Some(graph) = self.graph.take() else {
            return Err(CatalogError::FeedStructure {
                section: FeedSection::Categories.element_name(),
            });
        };
        if !self.offers_closed {
            return Err(CatalogError::FeedStructure {
                section: FeedSection::Offers.element_name(),
            });
        }

        let products: Vec<Product> = std::mem::take(&mut self.products).into_values().collect();

        let mut meta = SnapshotMeta::new(feed_digest);
        meta.accepted = self.report.accepted;
        meta.skipped = self.report.skipped;

        self.report.snapshot_id = meta.id.clone();
        self.report.feed_digest = meta.feed_digest.clone();
        self.report.products = products.len();

        (self.progress)(IngestProgress::Finished {
            accepted: self.report.accepted,
            skipped: self.report.skipped,
            products: products.len(),
        });
        info!(
            accepted = self.report.accepted,
            skipped = self.report.skipped,
            products = products.len(),
            categories = graph.len(),
            "feed ingested"
        );

        let snapshot = CatalogSnapshot::build(meta, graph, products, self.options.search_weights);
        Ok((snapshot, self.report))
    }

    fn build_graph(&mut self) {
        let graph = std::mem::take(&mut self.builder).build();
        self.report.categories = graph.len();
        self.report.synthesized_categories = graph.synthesized();
        self.report.cycles_broken = graph.cycles_broken();
        (self.progress)(IngestProgress::CategoriesBuilt {
            categories: graph.len(),
            synthesized: graph.synthesized(),
            skipped: self.report.skipped_categories,
        });
        self.graph = Some(graph);

        for raw in std::mem::take(&mut self.pending) {
            self.accept_offer(raw);
        }
    }

    fn accept_offer(&mut self, raw: RawOffer) {
        let Some(graph) = self.graph.as_ref() else {
            return;
        };
        match validate_offer(&raw, graph) {
            Ok(product) => {
                self.report.accepted += 1;
                if let Some(previous) = self.products.insert(product.id.clone(), product) {
                    debug!(id = %previous.id, "duplicate offer id, later record wins");
                }
            }
            Err(reason) => {
                warn!(id = ?raw.id, %reason, "skipping offer");
                self.report.skipped += 1;
                self.report.record_skip(reason);
            }
        }

        let seen = self.report.accepted + self.report.skipped;
        if self.options.progress_every > 0 && seen % self.options.progress_every == 0 {
            (self.progress)(IngestProgress::Offers {
                accepted: self.report.accepted,
                skipped: self.report.skipped,
            });
        }
    }
}

/// Turn a raw offer into a product, or say why it cannot be one.
pub fn validate_offer(raw: &RawOffer, graph: &CategoryGraph) -> std::result::Result<Product, SkipReason> {
    let id = non_empty(raw.id.as_deref()).ok_or(SkipReason::MissingId)?;
    let name = non_empty(raw.name.as_deref()).ok_or(SkipReason::MissingName)?;
    let price = parse_price(raw.price.as_deref())?;

    let article = non_empty(raw.vendor_code.as_deref()).unwrap_or(id);
    let url = non_empty(raw.url.as_deref()).map(str::to_string);
    let pictures: Vec<String> = raw
        .pictures
        .iter()
        .filter_map(|p| non_empty(Some(p)))
        .map(str::to_string)
        .collect();

    let mut direct = BTreeSet::new();
    for r in &raw.category_refs {
        match parse_category_id(r) {
            Some(cid) if graph.contains(cid) => {
                direct.insert(cid);
            }
            _ => debug!(offer = id, category = %r, "dropping unresolvable category reference"),
        }
    }

    let category_ids = resolve_closure(graph, &direct);
    if category_ids.is_empty() {
        return Err(SkipReason::NoCategories);
    }

    Ok(Product {
        id: id.to_string(),
        article: article.to_string(),
        name: name.to_string(),
        price,
        url,
        pictures,
        direct_category_ids: direct,
        category_ids,
    })
}

/// Direct categories plus all their ancestors.
pub fn resolve_closure(graph: &CategoryGraph, direct: &BTreeSet<CategoryId>) -> BTreeSet<CategoryId> {
    let mut closure = BTreeSet::new();
    for &cid in direct {
        if !graph.contains(cid) || !closure.insert(cid) {
            continue;
        }
        closure.extend(graph.ancestors(cid));
    }
    closure
}

fn parse_price(raw: Option<&str>) -> std::result::Result<f64, SkipReason> {
    let text = non_empty(raw).ok_or(SkipReason::MissingPrice)?;
    match text.parse::<f64>() {
        Ok(p) if p.is_finite() && p >= 0.0 => Ok(p),
        _ => Err(SkipReason::InvalidPrice),
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawCategory;

    fn category(id: &str, parent: Option<&str>, name: &str) -> FeedRecord {
        FeedRecord::Category(RawCategory {
            id: Some(id.into()),
            parent_id: parent.map(Into::into),
            name: name.into(),
        })
    }

    fn offer(id: &str, price: Option<&str>, cats: &[&str]) -> RawOffer {
        RawOffer {
            id: Some(id.into()),
            name: Some(format!("Product {}", id)),
            price: price.map(Into::into),
            category_refs: cats.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    fn feed(offers: Vec<RawOffer>) -> Vec<Result<FeedRecord>> {
        let mut records = vec![
            category("1", None, "Root"),
            category("2", Some("1"), "Parent"),
            category("3", Some("2"), "Leaf"),
            FeedRecord::SectionEnd(FeedSection::Categories),
        ];
        records.extend(offers.into_iter().map(FeedRecord::Offer));
        records.push(FeedRecord::SectionEnd(FeedSection::Offers));
        records.into_iter().map(Ok).collect()
    }

    fn run(records: Vec<Result<FeedRecord>>) -> Result<(CatalogSnapshot, IngestReport)> {
        FeedIngestor::new(IngestOptions::default()).run(records, "digest")
    }

    #[test]
    fn test_closure_includes_all_ancestors() {
        let (snapshot, report) = run(feed(vec![offer("p1", Some("10"), &["3"])])).unwrap();
        assert_eq!(report.accepted, 1);
        let p = snapshot.product("p1").unwrap();
        assert_eq!(p.direct_category_ids, BTreeSet::from([3]));
        assert_eq!(p.category_ids, BTreeSet::from([1, 2, 3]));
        assert_eq!(p.article, "p1");
    }

    #[test]
    fn test_missing_price_is_one_skip() {
        let (snapshot, report) = run(feed(vec![
            offer("p1", Some("10"), &["3"]),
            offer("p2", None, &["3"]),
            offer("p3", Some("5.5"), &["1"]),
        ]))
        .unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.skip_reasons.get(&SkipReason::MissingPrice), Some(&1));
        assert_eq!(snapshot.products().len(), 2);
    }

    #[test]
    fn test_invalid_fields_are_skipped_with_reasons() {
        let mut no_name = offer("p2", Some("1"), &["3"]);
        no_name.name = Some("   ".into());
        let no_id = RawOffer {
            id: None,
            ..offer("x", Some("1"), &["3"])
        };
        let (_, report) = run(feed(vec![
            offer("p1", Some("-1"), &["3"]),
            no_name,
            no_id,
            offer("p4", Some("abc"), &["3"]),
            offer("p5", Some("NaN"), &["3"]),
            offer("p6", Some("3"), &["404"]),
            offer("p7", Some("3"), &[]),
        ]))
        .unwrap();
        assert_eq!(report.accepted, 0);
        assert_eq!(report.skipped, 7);
        assert_eq!(report.skip_reasons[&SkipReason::InvalidPrice], 3);
        assert_eq!(report.skip_reasons[&SkipReason::MissingName], 1);
        assert_eq!(report.skip_reasons[&SkipReason::MissingId], 1);
        assert_eq!(report.skip_reasons[&SkipReason::NoCategories], 2);
    }

    #[test]
    fn test_unknown_category_dropped_known_kept() {
        let (snapshot, _) = run(feed(vec![offer("p1", Some("1"), &["404", "2", "oops"])])).unwrap();
        let p = snapshot.product("p1").unwrap();
        assert_eq!(p.direct_category_ids, BTreeSet::from([2]));
        assert_eq!(p.category_ids, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_vendor_code_becomes_article() {
        let mut o = offer("p1", Some("1"), &["3"]);
        o.vendor_code = Some(" SKU-42 ".into());
        o.url = Some("  ".into());
        o.pictures = vec!["a.jpg".into(), "".into(), "b.jpg".into()];
        let (snapshot, _) = run(feed(vec![o])).unwrap();
        let p = snapshot.product("p1").unwrap();
        assert_eq!(p.article, "SKU-42");
        assert_eq!(p.url, None);
        assert_eq!(p.pictures, vec!["a.jpg", "b.jpg"]);
        assert_eq!(p.picture(), Some("a.jpg"));
    }

    #[test]
    fn test_duplicate_offer_later_wins() {
        let (snapshot, report) = run(feed(vec![
            offer("p1", Some("1"), &["3"]),
            offer("p1", Some("2"), &["1"]),
        ]))
        .unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(report.products, 1);
        let p = snapshot.product("p1").unwrap();
        assert_eq!(p.price, 2.0);
        assert_eq!(p.category_ids, BTreeSet::from([1]));
    }

    #[test]
    fn test_offers_before_categories_are_resolved() {
        let records = vec![
            FeedRecord::Offer(offer("p1", Some("1"), &["2"])),
            FeedRecord::SectionEnd(FeedSection::Offers),
            category("1", None, "Root"),
            category("2", Some("1"), "Child"),
            FeedRecord::SectionEnd(FeedSection::Categories),
        ];
        let (snapshot, report) = run(records.into_iter().map(Ok).collect()).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(
            snapshot.product("p1").unwrap().category_ids,
            BTreeSet::from([1, 2])
        );
    }

    #[test]
    fn test_missing_sections_are_fatal() {
        let no_categories = vec![
            FeedRecord::Offer(offer("p1", Some("1"), &["1"])),
            FeedRecord::SectionEnd(FeedSection::Offers),
        ];
        let err = run(no_categories.into_iter().map(Ok).collect()).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::FeedStructure {
                section: "categories"
            }
        ));

        let no_offers = vec![
            category("1", None, "Root"),
            FeedRecord::SectionEnd(FeedSection::Categories),
        ];
        let err = run(no_offers.into_iter().map(Ok).collect()).unwrap_err();
        assert!(matches!(err, CatalogError::FeedStructure { section: "offers" }));
    }

    #[test]
    fn test_reader_error_aborts_run() {
        let mut records = feed(vec![offer("p1", Some("1"), &["3"])]);
        records.insert(2, Err(CatalogError::feed_parse("mismatched tag")));
        assert!(matches!(run(records), Err(CatalogError::FeedParse { .. })));
    }

    #[test]
    fn test_progress_events() {
        let mut events = Vec::new();
        let offers = (0..5).map(|i| offer(&format!("p{}", i), Some("1"), &["3"])).collect();
        let options = IngestOptions {
            progress_every: 2,
            ..Default::default()
        };
        FeedIngestor::new(options)
            .with_progress(|e| events.push(e))
            .run(feed(offers), "d")
            .unwrap();
        assert_eq!(
            events,
            vec![
                IngestProgress::CategoriesBuilt {
                    categories: 3,
                    synthesized: 0,
                    skipped: 0
                },
                IngestProgress::Offers {
                    accepted: 2,
                    skipped: 0
                },
                IngestProgress::Offers {
                    accepted: 4,
                    skipped: 0
                },
                IngestProgress::Finished {
                    accepted: 5,
                    skipped: 0,
                    products: 5
                },
            ]
        );
    }

    #[test]
    fn test_skipped_category_is_counted() {
        let records = vec![
            category("1", None, "Root"),
            category("bad", None, "Broken"),
            FeedRecord::SectionEnd(FeedSection::Categories),
            FeedRecord::SectionEnd(FeedSection::Offers),
        ];
        let (_, report) = run(records.into_iter().map(Ok).collect()).unwrap();
        assert_eq!(report.categories, 1);
        assert_eq!(report.skipped_categories, 1);
        assert_eq!(report.skip_reasons[&SkipReason::InvalidCategoryId], 1);
    }
}
