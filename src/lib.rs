//! # Catalog Harness
//!
//! A local-first product catalog engine: ingest a YML-style XML feed,
//! rebuild the category hierarchy, count products per category without
//! double counting, and answer category, pagination and search queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ FeedSource  │──▶│  FeedReader  │──▶│ FeedIngestor│
//! │ file / URL  │   │  (quick-xml) │   │   (core)    │
//! └─────────────┘   └──────────────┘   └──────┬──────┘
//!                                             │ CatalogSnapshot
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐          ┌──────────┐
//!                 │  SQLite  │          │ Catalog  │──▶ tree / products /
//!                 │  store   │          │ Arc swap │    search / stats
//!                 └──────────┘          └──────────┘
//! ```
//!
//! The engine itself (graph, aggregation, search ranking, queries) lives in
//! the I/O-free `catalog-core` crate. This crate adds configuration, feed
//! fetching and XML parsing, persistence, and the `catalog` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! catalog init                          # create database
//! catalog ingest --feed ./feed.xml      # load a feed
//! catalog tree                          # category tree with counts
//! catalog products 12 --page 2          # products under category 12
//! catalog search "cordless drill"
//! catalog stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`feed`] | Feed sources and the streaming XML reader |
//! | [`catalog`] | Single-writer catalog service with atomic snapshot swap |
//! | [`sqlite_store`] | SQLite snapshot persistence |
//! | [`progress`] | Ingestion progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`ingest`], [`tree`], [`products`], [`search`], [`stats`] | CLI commands |

pub mod catalog;
pub mod config;
pub mod db;
pub mod feed;
pub mod ingest;
pub mod migrate;
pub mod products;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod tree;
