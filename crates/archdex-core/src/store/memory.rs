//! In-memory [`SearchIndex`] for tests.
//!
//! Documents live in a `BTreeMap` behind `std::sync::RwLock`. Matching is a
//! plain lowercase token comparison over the full-text fields (no stemming),
//! scored by the number of matching clause occurrences. Every batch size is
//! recorded so tests can assert on batching behaviour, and a failure can be
//! injected at a chosen batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::document::IndexDocument;
use crate::error::{IndexError, QueryError};
use crate::query::{Clause, CompiledQuery, Explanation, FacetResult, Hit, SearchResult};
use crate::schema::IndexSchema;

use super::SearchIndex;

pub struct InMemoryIndex {
    schema: IndexSchema,
    docs: RwLock<BTreeMap<String, IndexDocument>>,
    batches: Mutex<Vec<usize>>,
    fail_on_batch: Option<usize>,
}

impl InMemoryIndex {
    pub fn new(schema: IndexSchema) -> Self {
        Self {
            schema,
            docs: RwLock::new(BTreeMap::new()),
            batches: Mutex::new(Vec::new()),
            fail_on_batch: None,
        }
    }

    /// Reject the `n`th write call (1-based) without storing anything.
    pub fn failing_on_batch(mut self, n: usize) -> Self {
        self.fail_on_batch = Some(n);
        self
    }

    /// Sizes of every write call seen so far, failed ones included.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<IndexDocument> {
        self.docs.read().ok()?.get(id).cloned()
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Occurrences of `clause` in `toks`.
fn occurrences(clause: &Clause, toks: &[String]) -> usize {
    let needle = tokens(clause.text());
    if needle.is_empty() || needle.len() > toks.len() {
        return 0;
    }
    toks.windows(needle.len()).filter(|w| *w == needle.as_slice()).count()
}

fn highlight(text: &str, clauses: &[Clause]) -> Option<String> {
    let wanted: Vec<String> = clauses.iter().flat_map(|c| tokens(c.text())).collect();
    let mut marked = false;
    let words: Vec<String> = text
        .split(' ')
        .map(|word| {
            if tokens(word).iter().any(|t| wanted.contains(t)) {
                marked = true;
                format!("<mark>{}</mark>", word)
            } else {
                word.to_string()
            }
        })
        .collect();
    marked.then(|| words.join(" "))
}

impl InMemoryIndex {
    fn full_text(&self, doc: &IndexDocument) -> Vec<String> {
        doc.fields()
            .into_iter()
            .filter(|(name, _)| {
                self.schema
                    .field(name)
                    .map(|f| f.is_full_text())
                    .unwrap_or(false)
            })
            .flat_map(|(_, value)| tokens(&value.as_text()))
            .collect()
    }

    fn terms_of(doc: &IndexDocument, field: &str) -> Vec<String> {
        doc.fields()
            .into_iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value.terms())
            .unwrap_or_default()
    }

    /// Score of `doc`, or `None` when it does not match.
    fn score(&self, doc: &IndexDocument, query: &CompiledQuery) -> Option<f64> {
        for (field, value) in &query.filters {
            if !Self::terms_of(doc, field).contains(value) {
                return None;
            }
        }

        let toks = self.full_text(doc);
        let expr = &query.expr;
        if expr.must_not.iter().any(|c| occurrences(c, &toks) > 0) {
            return None;
        }
        if !expr.has_positive() {
            return Some(0.0);
        }

        let counts: Vec<usize> = expr.positive().iter().map(|c| occurrences(c, &toks)).collect();
        let matched = if expr.must.is_empty() {
            counts.iter().any(|&n| n > 0)
        } else {
            counts.iter().all(|&n| n > 0)
        };
        matched.then(|| counts.iter().sum::<usize>() as f64)
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    async fn write_batch(&self, docs: &[IndexDocument]) -> Result<(), IndexError> {
        let call = {
            let mut batches = self
                .batches
                .lock()
                .map_err(|e| IndexError::Backend(e.to_string()))?;
            batches.push(docs.len());
            batches.len()
        };
        if self.fail_on_batch == Some(call) {
            return Err(IndexError::Backend(format!("injected failure on batch {}", call)));
        }

        let mut stored = self
            .docs
            .write()
            .map_err(|e| IndexError::Backend(e.to_string()))?;
        for doc in docs {
            stored.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<SearchResult, QueryError> {
        let docs = self
            .docs
            .read()
            .map_err(|e| QueryError::Backend(e.to_string()))?;

        let mut matches: Vec<(&IndexDocument, f64)> = docs
            .values()
            .filter_map(|doc| self.score(doc, query).map(|s| (doc, s)))
            .collect();
        matches.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        let facet = query.facet.as_ref().map(|facet| {
            let mut counts: HashMap<String, u64> = HashMap::new();
            let mut missing = 0;
            for (doc, _) in &matches {
                let terms = Self::terms_of(doc, &facet.field);
                if terms.is_empty() {
                    missing += 1;
                }
                for term in terms {
                    *counts.entry(term).or_default() += 1;
                }
            }
            FacetResult::from_counts(&facet.field, counts, missing, facet.top_n)
        });

        let hits = matches
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(doc, score)| {
                let fields: BTreeMap<String, _> = doc
                    .fields()
                    .into_iter()
                    .filter(|(name, _)| self.schema.field(name).map(|f| f.stored).unwrap_or(false))
                    .map(|(name, value)| (name.to_string(), value))
                    .collect();

                let mut fragments = BTreeMap::new();
                for name in &query.highlight_fields {
                    if let Some(value) = fields.get(name) {
                        if let Some(fragment) = highlight(&value.as_text(), query.expr.positive()) {
                            fragments.insert(name.clone(), vec![fragment]);
                        }
                    }
                }

                Hit {
                    id: doc.id.clone(),
                    score: *score,
                    fields,
                    fragments,
                    explanation: query.explain.then(|| Explanation {
                        engine: "memory".to_string(),
                        expression: format!("{:?}", query.expr.positive()),
                        raw_rank: *score,
                    }),
                }
            })
            .collect();

        Ok(SearchResult {
            total_hits: matches.len() as u64,
            offset: query.offset,
            limit: query.limit,
            hits,
            facet,
        })
    }

    async fn document_count(&self) -> Result<u64, QueryError> {
        let docs = self
            .docs
            .read()
            .map_err(|e| QueryError::Backend(e.to_string()))?;
        Ok(docs.len() as u64)
    }
}
