use anyhow::Result;
use catalog_core::query::SearchResultItem;

use crate::catalog::open_catalog;
use crate::config::Config;

pub async fn run_search(config: &Config, query: &str, json: bool) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let results = catalog.search(query);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No results.");
    } else {
        for (i, result) in results.iter().enumerate() {
            print!("{}", render_result(i + 1, result));
        }
    }

    catalog.store().close().await;
    Ok(())
}

fn render_result(rank: usize, result: &SearchResultItem) -> String {
    let p = &result.product;
    let mut out = format!(
        "{}. [{:.2}] {} / {}\n    price: {:.2}\n",
        rank, result.score, p.article, p.name, p.price
    );
    for path in &p.category_paths {
        out.push_str(&format!("    category: {}\n", path));
    }
    if let Some(ref url) = p.url {
        out.push_str(&format!("    url: {}\n", url));
    }
    out.push_str(&format!("    id: {}\n\n", p.id));
    out
}
