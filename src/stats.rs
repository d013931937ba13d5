//! Catalog statistics and health overview.
//!
//! Provides a quick summary of the published snapshot: category and product
//! counts, image coverage, price range, and when and from what the snapshot
//! was built. Used by `catalog stats` to confirm that ingestion worked.

use anyhow::Result;

use crate::catalog::open_catalog;
use crate::config::Config;
use crate::progress::format_number;

/// Run the stats command: load the catalog and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let stats = catalog.statistics();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Catalog Harness: Catalog Stats");
    println!("==============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    if stats.feed_digest.is_empty() {
        println!("  Snapshot:    none (run `catalog ingest`)");
    } else {
        println!(
            "  Snapshot:    {} ({})",
            stats.snapshot_id,
            format_ts_relative(stats.created_at.timestamp())
        );
        println!("  Feed digest: {}", stats.feed_digest);
        println!(
            "  Last run:    {} accepted, {} skipped",
            format_number(stats.accepted),
            format_number(stats.skipped)
        );
    }
    println!();
    println!(
        "  Categories:  {} ({} with products)",
        format_number(stats.category_count as u64),
        format_number(stats.categories_with_products_count as u64)
    );
    println!(
        "  Products:    {} ({} with image, {}%)",
        format_number(stats.product_count as u64),
        format_number(stats.products_with_image_count as u64),
        if stats.product_count > 0 {
            (stats.products_with_image_count * 100) / stats.product_count
        } else {
            0
        }
    );
    println!(
        "  Price:       min {:.2} / avg {:.2} / max {:.2}",
        stats.min_price, stats.avg_price, stats.max_price
    );
    println!(
        "  Search:      {} indexed terms",
        format_number(stats.indexed_terms as u64)
    );
    println!();

    catalog.store().close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_time_buckets() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now - 3 * 86400), "3 days ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}
