//! # archdex core
//!
//! Pure logic for archdex: raw archival record models, reference resolution
//! into normalized views, the index schema, typed index documents, batched
//! writes and query shaping.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Storage engines
//! plug in through the [`store::SearchIndex`] trait; an in-memory
//! implementation lives in [`store::memory`].

pub mod batch;
pub mod document;
pub mod error;
pub mod models;
pub mod query;
pub mod resolve;
pub mod schema;
pub mod store;
