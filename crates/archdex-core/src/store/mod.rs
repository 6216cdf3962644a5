//! Search index abstraction.
//!
//! The [`SearchIndex`] trait is the whole contract the pipeline needs from a
//! search engine: write a batch of documents atomically, run a compiled
//! query, and count what is stored. The application crate implements it on
//! SQLite FTS5; [`memory::InMemoryIndex`] backs the tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::document::IndexDocument;
use crate::error::{IndexError, QueryError};
use crate::query::{CompiledQuery, SearchResult};
use crate::schema::IndexSchema;

/// An opened index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`schema`](SearchIndex::schema) | The authoritative field configuration |
/// | [`write_batch`](SearchIndex::write_batch) | Upsert a batch in one atomic write |
/// | [`execute`](SearchIndex::execute) | Run a validated query |
/// | [`document_count`](SearchIndex::document_count) | Number of stored documents |
#[async_trait]
pub trait SearchIndex: Send + Sync {
    fn schema(&self) -> &IndexSchema;

    /// Write all documents or none. Writing an id that already exists
    /// replaces the stored document entirely.
    async fn write_batch(&self, docs: &[IndexDocument]) -> Result<(), IndexError>;

    async fn execute(&self, query: &CompiledQuery) -> Result<SearchResult, QueryError>;

    async fn document_count(&self) -> Result<u64, QueryError>;
}
