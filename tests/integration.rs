use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<yml_catalog date="2024-05-01 10:00">
  <shop>
    <name>Test shop</name>
    <categories>
      <category id="1">Tools</category>
      <category id="2" parentId="1">Power tools</category>
      <category id="3" parentId="2">Drills</category>
      <category id="5" parentId="99">Garden</category>
    </categories>
    <offers>
      <offer id="p1">
        <name>Cordless drill</name>
        <price>99.90</price>
        <vendorCode>DR-100</vendorCode>
        <url>https://shop.example/p1</url>
        <picture>https://shop.example/p1.jpg</picture>
        <categoryId>3</categoryId>
      </offer>
      <offer id="p2">
        <name>Claw hammer</name>
        <price>12.50</price>
        <vendorCode>HM-1</vendorCode>
        <categoryId>1</categoryId>
      </offer>
      <offer id="p3">
        <name>Leaf rake</name>
        <price>20</price>
        <vendorCode>RK-7</vendorCode>
        <categories><categoryId>5</categoryId></categories>
      </offer>
      <offer id="p4">
        <name>Priceless saw</name>
        <vendorCode>SW-2</vendorCode>
        <categoryId>2</categoryId>
      </offer>
    </offers>
  </shop>
</yml_catalog>
"#;

fn catalog_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("catalog");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    fs::write(root.join("feed.xml"), FEED).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/catalog.sqlite"

[feed]
source = "{root}/feed.xml"

[query]
default_per_page = 2
"#,
        root = root.display()
    );

    let config_path = config_dir.join("catalog.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_catalog(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = catalog_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run catalog binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingest(config_path: &Path) {
    let (stdout, stderr, success) = run_catalog(config_path, &["ingest", "--progress", "off"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_catalog(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/catalog.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_catalog(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_catalog(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    run_catalog(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_catalog(&config_path, &["ingest", "--progress", "off"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("categories: 5 (synthesized: 1, skipped: 0, cycles broken: 0)"));
    assert!(stdout.contains("offers accepted: 3"));
    assert!(stdout.contains("offers skipped: 1"));
    assert!(stdout.contains("missing_price: 1"));
    assert!(stdout.contains("products: 3"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_ingest_without_init() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);
    let (stdout, _, success) = run_catalog(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Products:    3"));
}

#[test]
fn test_tree_counts_subtrees() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_catalog(&config_path, &["tree"]);
    assert!(success, "tree failed: stderr={}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Tools [1] (2)",
            "  Power tools [2] (1)",
            "    Drills [3] (1)",
            "Category 99 [99] (1)",
            "  Garden [5] (1)",
        ]
    );
}

#[test]
fn test_tree_json() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, _, success) = run_catalog(&config_path, &["tree", "--json"]);
    assert!(success);
    let tree: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(tree[0]["id"], 1);
    assert_eq!(tree[0]["product_count"], 2);
    assert_eq!(tree[0]["children"][0]["children"][0]["name"], "Drills");
    assert_eq!(tree[1]["id"], 99);
}

#[test]
fn test_tree_before_ingest_is_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_catalog(&config_path, &["init"]);

    let (stdout, _, success) = run_catalog(&config_path, &["tree"]);
    assert!(success);
    assert!(stdout.contains("No categories."));
}

#[test]
fn test_products_paginates_subtree() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_catalog(&config_path, &["products", "1"]);
    assert!(success, "products failed: stderr={}", stderr);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["total_pages"], 1);
    assert_eq!(page["per_page"], 2);
    assert_eq!(page["items"][0]["id"], "p1");
    assert_eq!(page["items"][0]["category_paths"][0], "Tools > Power tools > Drills");
    assert_eq!(page["items"][1]["id"], "p2");

    let (stdout, _, success) =
        run_catalog(&config_path, &["products", "1", "--page", "2", "--per-page", "1"]);
    assert!(success);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["id"], "p2");
}

#[test]
fn test_products_rejects_bad_page() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (_, stderr, success) = run_catalog(&config_path, &["products", "1", "--page", "0"]);
    assert!(!success);
    assert!(stderr.contains("page must be >= 1"));
}

#[test]
fn test_products_unknown_category_is_empty() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, _, success) = run_catalog(&config_path, &["products", "404"]);
    assert!(success);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(page["total_count"], 0);
    assert!(page["items"].as_array().unwrap().is_empty());
}

#[test]
fn test_search_by_name_and_article() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_catalog(&config_path, &["search", "drill"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.starts_with("1. ["));
    assert!(stdout.contains("DR-100 / Cordless drill"));
    assert!(stdout.contains("category: Tools > Power tools > Drills"));

    let (stdout, _, success) = run_catalog(&config_path, &["search", "hm-1", "--json"]);
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits[0]["id"], "p2");
    assert_eq!(hits[0]["matched_terms"], 2);
}

#[test]
fn test_search_short_query_returns_nothing() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, _, success) = run_catalog(&config_path, &["search", "d"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (first, _, _) = run_catalog(&config_path, &["search", "rake drill", "--json"]);
    let (second, _, _) = run_catalog(&config_path, &["search", "rake drill", "--json"]);
    assert_eq!(first, second);
}

#[test]
fn test_stats_summary() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_catalog(&config_path, &["stats"]);
    assert!(success, "stats failed: stderr={}", stderr);
    assert!(stdout.contains("Categories:  5 (5 with products)"));
    assert!(stdout.contains("Products:    3 (1 with image, 33%)"));
    assert!(stdout.contains("min 12.50 / avg 44.13 / max 99.90"));
    assert!(stdout.contains("Last run:    3 accepted, 1 skipped"));
    // dr, 100, cordless, drill, hm, 1, claw, hammer, rk, 7, leaf, rake
    assert!(stdout.contains("Search:      12 indexed terms"));
}

#[test]
fn test_reingest_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);
    let (tree_a, _, _) = run_catalog(&config_path, &["tree", "--json"]);
    let (page_a, _, _) = run_catalog(&config_path, &["products", "1"]);

    ingest(&config_path);
    let (tree_b, _, _) = run_catalog(&config_path, &["tree", "--json"]);
    let (page_b, _, _) = run_catalog(&config_path, &["products", "1"]);

    assert_eq!(tree_a, tree_b);
    assert_eq!(page_a, page_b);
}

#[test]
fn test_missing_feed_fails_and_keeps_catalog() {
    let (tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let missing = tmp.path().join("nope.xml");
    let (_, stderr, success) = run_catalog(
        &config_path,
        &["ingest", "--feed", missing.to_str().unwrap(), "--progress", "off"],
    );
    assert!(!success);
    assert!(stderr.contains("Failed to ingest feed"));

    let (stdout, _, success) = run_catalog(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Products:    3"));
}

#[test]
fn test_malformed_feed_fails() {
    let (tmp, config_path) = setup_test_env();
    let bad = tmp.path().join("bad.xml");
    fs::write(&bad, "<yml_catalog><shop><categories></shop>").unwrap();

    let (_, _, success) = run_catalog(
        &config_path,
        &["ingest", "--feed", bad.to_str().unwrap(), "--progress", "off"],
    );
    assert!(!success);
}

#[test]
fn test_invalid_progress_flag() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_catalog(&config_path, &["ingest", "--progress", "loud"]);
    assert!(!success);
    assert!(stderr.contains("Invalid --progress value"));
}
