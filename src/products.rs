//! `catalog products`: one page of products under a category.

use anyhow::{Context, Result};

use crate::catalog::open_catalog;
use crate::config::Config;

pub async fn run_products(
    config: &Config,
    category_id: i64,
    page: i64,
    per_page: Option<i64>,
) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let per_page = per_page.unwrap_or(config.query.default_per_page as i64);

    let result = catalog
        .products_by_category(category_id, page, per_page)
        .with_context(|| format!("Failed to list products of category {}", category_id))?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    catalog.store().close().await;
    Ok(())
}
