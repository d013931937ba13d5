//! `catalog ingest`: replace the catalog with the contents of a feed.

use anyhow::{Context, Result};

use crate::catalog::open_catalog;
use crate::config::Config;
use crate::feed::FeedSource;
use crate::progress::{format_number, ProgressMode};

pub async fn run_ingest(config: &Config, feed: Option<String>, progress: ProgressMode) -> Result<()> {
    let source = feed
        .or_else(|| config.feed.source.clone())
        .map(|s| FeedSource::parse(&s))
        .ok_or_else(|| {
            anyhow::anyhow!("No feed source. Pass --feed or set [feed].source in config.")
        })?;

    let catalog = open_catalog(config).await?;
    let reporter = progress.reporter();
    let report = catalog
        .ingest(&source, reporter.as_ref())
        .await
        .with_context(|| format!("Failed to ingest feed {}", source))?;

    println!("ingest {}", source);
    println!(
        "  categories: {} (synthesized: {}, skipped: {}, cycles broken: {})",
        format_number(report.categories as u64),
        report.synthesized_categories,
        report.skipped_categories,
        report.cycles_broken
    );
    println!("  offers accepted: {}", format_number(report.accepted));
    println!("  offers skipped: {}", format_number(report.skipped));
    for (reason, count) in &report.skip_reasons {
        println!("    {}: {}", reason, count);
    }
    println!("  products: {}", format_number(report.products as u64));
    println!("  snapshot: {}", report.snapshot_id);
    println!("  digest: {}", report.feed_digest);
    println!("  duration: {} ms", report.duration_ms);
    println!("ok");

    catalog.store().close().await;
    Ok(())
}
