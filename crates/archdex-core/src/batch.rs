//! Batched writes into a [`SearchIndex`].
//!
//! Documents are accumulated in arrival order. A batch is flushed as soon as
//! it holds `batch_size` documents, and whatever remains when the input runs
//! out is flushed once more, so `N` documents produce `ceil(N / batch_size)`
//! write calls. The first failed write stops the run; batches already
//! written stay in the index.

use std::time::{Duration, Instant};

use crate::document::IndexDocument;
use crate::error::IndexError;
use crate::store::SearchIndex;

/// Snapshot passed to an [`IndexProgress`] after every successful batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress {
    /// Batches written so far.
    pub batches: usize,
    /// Documents written so far.
    pub documents: u64,
    /// Size of the batch just written.
    pub last_batch: usize,
    pub elapsed: Duration,
}

impl BatchProgress {
    /// Mean wall time per written document.
    pub fn mean_latency(&self) -> Duration {
        if self.documents == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.elapsed.as_secs_f64() / self.documents as f64)
    }
}

/// Observer for batch commits. Reporting only; never affects control flow.
pub trait IndexProgress: Send + Sync {
    fn batch_written(&self, progress: &BatchProgress);
}

/// Discards progress events.
pub struct NoProgress;

impl IndexProgress for NoProgress {
    fn batch_written(&self, _progress: &BatchProgress) {}
}

/// Totals for a completed run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub documents: u64,
    pub batches: usize,
    pub elapsed: Duration,
}

/// Bounded FIFO buffer of documents awaiting one write call.
#[derive(Debug)]
pub struct Batch {
    capacity: usize,
    docs: Vec<IndexDocument>,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Result<Self, IndexError> {
        if capacity == 0 {
            return Err(IndexError::InvalidBatchSize);
        }
        Ok(Self {
            capacity,
            docs: Vec::with_capacity(capacity),
        })
    }

    /// Append a document; returns `true` once the batch is full.
    pub fn push(&mut self, doc: IndexDocument) -> bool {
        self.docs.push(doc);
        self.docs.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn documents(&self) -> &[IndexDocument] {
        &self.docs
    }

    pub fn clear(&mut self) {
        self.docs.clear();
    }
}

struct Run<'a, I: ?Sized> {
    index: &'a I,
    progress: &'a dyn IndexProgress,
    started: Instant,
    batches: usize,
    documents: u64,
}

impl<I: SearchIndex + ?Sized> Run<'_, I> {
    async fn flush(&mut self, batch: &mut Batch) -> Result<(), IndexError> {
        let size = batch.len();
        let number = self.batches + 1;

        if let Err(e) = self.index.write_batch(batch.documents()).await {
            return Err(IndexError::BatchFailed {
                batch: number,
                documents: size,
                written: self.documents,
                source: Box::new(e),
            });
        }

        self.batches = number;
        self.documents += size as u64;
        batch.clear();

        let snapshot = BatchProgress {
            batches: self.batches,
            documents: self.documents,
            last_batch: size,
            elapsed: self.started.elapsed(),
        };
        tracing::info!(
            batch = snapshot.batches,
            size,
            total = snapshot.documents,
            "batch committed"
        );
        self.progress.batch_written(&snapshot);
        Ok(())
    }
}

/// Stream `docs` into `index` in batches of `batch_size`.
///
/// Every document is validated against the index schema before it is
/// buffered; a validation failure stops the run like a failed write.
pub async fn index_all<I, D>(
    index: &I,
    docs: D,
    batch_size: usize,
    progress: &dyn IndexProgress,
) -> Result<IndexStats, IndexError>
where
    I: SearchIndex + ?Sized,
    D: IntoIterator<Item = IndexDocument>,
{
    let mut batch = Batch::with_capacity(batch_size)?;
    let mut run = Run {
        index,
        progress,
        started: Instant::now(),
        batches: 0,
        documents: 0,
    };

    for doc in docs {
        doc.validate(index.schema())?;
        if batch.push(doc) {
            run.flush(&mut batch).await?;
        }
    }
    if !batch.is_empty() {
        run.flush(&mut batch).await?;
    }

    Ok(IndexStats {
        documents: run.documents,
        batches: run.batches,
        elapsed: run.started.elapsed(),
    })
}
