//! Error taxonomy shared by the loader, indexer and query service.
//!
//! A reference that cannot be resolved is deliberately absent here: it is
//! data ([`Resolved::Unresolved`](crate::resolve::Resolved::Unresolved)),
//! not a failure.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while building entity maps from a dataset directory.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The directory itself cannot be listed. Fatal for the run.
    #[error("cannot read {kind} directory {}: {source}", path.display())]
    DirectoryUnreadable {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single file could not be read or parsed. Callers skip and log it.
    #[error("cannot load {}: {reason}", path.display())]
    File { path: PathBuf, reason: String },
}

/// Problems with an index schema or with a document checked against one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("field name '{0}' must match [a-z_][a-z0-9_]*")]
    InvalidFieldName(String),

    #[error("schema declares no searchable text field")]
    NoSearchableFields,

    #[error("document {id} carries field '{field}' which the index schema does not declare")]
    UndeclaredField { id: String, field: String },

    #[error("stored schema is unreadable: {0}")]
    Unreadable(String),
}

/// Failures while creating, opening, or writing to an index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("cannot open index at {}: {message}", path.display())]
    Open { path: PathBuf, message: String },

    #[error("{} exists but is not an archdex index", path.display())]
    NotAnIndex { path: PathBuf },

    /// A batch write was rejected. Batches written before it stay persisted.
    #[error("batch {batch} ({documents} documents) failed after {written} documents were indexed: {source}")]
    BatchFailed {
        batch: usize,
        documents: usize,
        written: u64,
        #[source]
        source: Box<IndexError>,
    },

    #[error("index backend error: {0}")]
    Backend(String),
}

/// Failures surfaced by the query service.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("malformed query: {0}")]
    Malformed(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' cannot be highlighted (must be stored and full-text indexed)")]
    FieldNotHighlightable(String),

    #[error("field '{0}' cannot be faceted or filtered (needs term vectors or the keyword analyzer)")]
    FieldNotFacetable(String),

    #[error("index at {} is unavailable: {message}", path.display())]
    IndexUnavailable { path: PathBuf, message: String },

    #[error("search backend error: {0}")]
    Backend(String),
}
