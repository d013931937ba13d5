//! `catalog tree`: print the category forest with subtree product counts.

use anyhow::Result;
use catalog_core::query::CategoryTreeNode;

use crate::catalog::open_catalog;
use crate::config::Config;

pub async fn run_tree(config: &Config, json: bool) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let tree = catalog.category_tree();

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else if tree.is_empty() {
        println!("No categories.");
    } else {
        for line in render_tree(&tree) {
            println!("{}", line);
        }
    }

    catalog.store().close().await;
    Ok(())
}

/// One line per node, two spaces of indent per level, pre-order.
pub fn render_tree(roots: &[CategoryTreeNode]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut stack: Vec<(&CategoryTreeNode, usize)> = roots.iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        lines.push(format!(
            "{}{} [{}] ({})",
            "  ".repeat(depth),
            node.name,
            node.id,
            node.product_count
        ));
        stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, name: &str, count: usize, children: Vec<CategoryTreeNode>) -> CategoryTreeNode {
        CategoryTreeNode {
            id,
            name: name.to_string(),
            product_count: count,
            children,
        }
    }

    #[test]
    fn render_is_preorder_with_indent() {
        let tree = vec![
            node(
                1,
                "Tools",
                3,
                vec![node(2, "Drills", 2, vec![]), node(3, "Saws", 1, vec![])],
            ),
            node(4, "Garden", 0, vec![]),
        ];
        assert_eq!(
            render_tree(&tree),
            vec![
                "Tools [1] (3)",
                "  Drills [2] (2)",
                "  Saws [3] (1)",
                "Garden [4] (0)",
            ]
        );
    }
}
