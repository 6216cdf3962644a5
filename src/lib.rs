//! # archdex
//!
//! Resolves archival accession exports into self-contained views and indexes
//! them for faceted full-text search.
//!
//! An export is a directory of JSON records, one file per entity. Accessions
//! point at subjects, digital objects and agents by URI; archdex inlines
//! those references, writes one search document per accession to a SQLite
//! FTS5 index and answers queries with highlights and facets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │   Loader    │──▶│  Normalizer  │──▶│ Batch writer │──▶│  SQLite  │
//! │ JSON files  │   │ inline refs  │   │  N per txn   │   │   FTS5   │
//! └─────────────┘   └──────────────┘   └──────────────┘   └────┬─────┘
//!                                                              │
//!                                                         ┌────▼─────┐
//!                                                         │  Search  │
//!                                                         └──────────┘
//! ```
//!
//! The pure parts (models, resolver, schema, batching, query shaping) live
//! in `archdex-core`; this crate adds the filesystem, SQLite and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | Entity files → URI-keyed maps |
//! | [`pipeline`] | The `build` flow |
//! | [`sqlite_index`] | SQLite FTS5 search index |
//! | [`search`] | The `search` command |
//! | [`normalize`] | The `normalize` command |
//! | [`stats`] | The `stats` command |
//! | [`progress`] | Build progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index table creation |

pub mod config;
pub mod db;
pub mod loader;
pub mod migrate;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod sqlite_index;
pub mod stats;
