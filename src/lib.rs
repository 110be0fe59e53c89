//! # Site Index
//!
//! Offline indexer for a rendered static documentation site.
//!
//! Site Index walks the output tree of a static site generator, classifies
//! every file, and from that single pass writes the site's `sitemap.xml`, a
//! set of file reports, and the search records for a hosted search index,
//! which it can replace in full.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  walk_tree  │──▶│     TaskPool      │──▶│ ReportWriter │──▶ sitemap.xml
//! │ (breadth)   │   │ classify+extract │   │ (URL order)  │──▶ reports/*
//! └─────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                 ▼
//!                                          ┌──────────────┐
//!                                          │ hosted index │
//!                                          │  (optional)  │
//!                                          └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! site-index index                   # sitemap, reports, search-index.json
//! site-index analyze                 # classification and file reports only
//! site-index --short index           # skip the configured expensive subtrees
//! site-index --push index            # also replace the hosted index
//! site-index classify dist/docs/home.html
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and `WH_*` overrides |
//! | [`models`] | `FileType`, `SearchRecord`, `FileMetadata` |
//! | [`classify`] | File type decision table |
//! | [`extract`] | Search record extraction strategies |
//! | [`page_views`] | Page-view mapping |
//! | [`pool`] | Bounded parallel worker pool |
//! | [`walk`] | Breadth-wise output tree traversal |
//! | [`report`] | Report aggregation |
//! | [`sitemap`] | `sitemap.xml` writer and priorities |
//! | [`stats`] | Per-type census |
//! | [`publish`] | Hosted index full replace |
//! | [`pipeline`] | The indexing run |
//! | [`progress`] | Progress on stderr |

pub mod classify;
pub mod config;
pub mod extract;
pub mod models;
pub mod page_views;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod publish;
pub mod report;
pub mod sitemap;
pub mod stats;
pub mod walk;
