//! SQLite FTS5-backed [`SearchIndex`].
//!
//! Maps each [`SearchIndex`] operation onto the tables laid out by
//! [`migrate`](crate::migrate). Relevance is FTS5's BM25 `rank`; a hit's
//! score is the negated rank so that higher is better.
//!
//! # Lifecycle
//!
//! | On disk | [`SqliteIndex::open_or_create`] | Schema in effect |
//! |---------|---------------------------------|------------------|
//! | nothing, or an empty database | [`IndexState::Created`] | the supplied one |
//! | an archdex index | [`IndexState::Opened`] | the stored one |
//! | anything else | [`IndexError::NotAnIndex`] | |

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use archdex_core::document::{FieldValue, IndexDocument};
use archdex_core::error::{IndexError, QueryError};
use archdex_core::query::{CompiledQuery, Explanation, FacetResult, Hit, SearchResult};
use archdex_core::schema::IndexSchema;
use archdex_core::store::SearchIndex;

use crate::db;
use crate::migrate;

/// How [`SqliteIndex::open_or_create`] found the storage path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Created,
    Opened,
}

pub struct SqliteIndex {
    pool: SqlitePool,
    path: PathBuf,
    schema: IndexSchema,
    fts_fields: Vec<String>,
}

fn index_backend(e: impl std::fmt::Display) -> IndexError {
    IndexError::Backend(e.to_string())
}

fn query_backend(e: sqlx::Error) -> QueryError {
    let message = e.to_string();
    if message.contains("fts5: syntax error") {
        QueryError::Malformed(message)
    } else {
        QueryError::Backend(message)
    }
}

impl SqliteIndex {
    fn new(pool: SqlitePool, path: &Path, schema: IndexSchema) -> Self {
        let fts_fields = schema
            .full_text_fields()
            .map(|f| f.name.to_string())
            .collect();
        Self {
            pool,
            path: path.to_path_buf(),
            schema,
            fts_fields,
        }
    }

    /// Create an index at `path` with `schema`, or open the one already
    /// there. An existing index keeps the schema it was created with.
    pub async fn open_or_create(
        path: &Path,
        schema: &IndexSchema,
    ) -> Result<(Self, IndexState), IndexError> {
        schema.validate()?;
        let open_err = |e: anyhow::Error| IndexError::Open {
            path: path.to_path_buf(),
            message: format!("{:#}", e),
        };

        let pool = db::connect(path).await.map_err(open_err)?;

        if let Some(json) = migrate::stored_schema(&pool).await.map_err(open_err)? {
            let stored = IndexSchema::from_json(&json)?;
            if &stored != schema {
                tracing::warn!(
                    path = %path.display(),
                    "existing index was created with a different schema; keeping the stored one"
                );
            }
            tracing::info!(path = %path.display(), "opened existing index");
            return Ok((Self::new(pool, path, stored), IndexState::Opened));
        }

        // An empty database (e.g. left by an interrupted first build) is
        // treated like a missing file.
        if !migrate::is_empty_database(&pool).await.map_err(open_err)? {
            pool.close().await;
            return Err(IndexError::NotAnIndex {
                path: path.to_path_buf(),
            });
        }

        migrate::create_index_tables(&pool, schema)
            .await
            .map_err(open_err)?;
        tracing::info!(path = %path.display(), "created index");
        Ok((Self::new(pool, path, schema.clone()), IndexState::Created))
    }

    /// Open an existing index for querying only.
    pub async fn open_read_only(path: &Path) -> Result<Self, QueryError> {
        let unavailable = |message: String| QueryError::IndexUnavailable {
            path: path.to_path_buf(),
            message,
        };

        let pool = db::connect_read_only(path)
            .await
            .map_err(|e| unavailable(format!("{:#}", e)))?;
        let json = migrate::stored_schema(&pool)
            .await
            .map_err(|e| unavailable(format!("{:#}", e)))?
            .ok_or_else(|| unavailable("not an archdex index".to_string()))?;
        let schema = IndexSchema::from_json(&json).map_err(|e| unavailable(e.to_string()))?;

        Ok(Self::new(pool, path, schema))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creation timestamp recorded in the index (RFC 3339).
    pub async fn created_at(&self) -> Result<Option<String>, QueryError> {
        sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'created_at'")
            .fetch_optional(&self.pool)
            .await
            .map_err(query_backend)
    }

    /// Document counts per `type` value.
    pub async fn counts_by_type(&self) -> Result<Vec<(String, i64)>, QueryError> {
        let rows = sqlx::query(
            "SELECT doc_type, COUNT(*) AS n FROM documents GROUP BY doc_type ORDER BY doc_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_backend)?;
        Ok(rows
            .iter()
            .map(|row| (row.get("doc_type"), row.get("n")))
            .collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    fn fts_insert_sql(&self) -> String {
        let mut columns = vec!["rowid".to_string(), "id".to_string()];
        columns.extend(self.fts_fields.iter().map(|f| format!("\"{}\"", f)));
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO documents_fts ({}) VALUES ({})",
            columns.join(", "),
            placeholders
        )
    }

    async fn upsert(
        &self,
        tx: &mut sqlx::SqliteConnection,
        doc: &IndexDocument,
        fts_sql: &str,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        let fields: BTreeMap<&str, FieldValue> = doc.fields().into_iter().collect();

        let stored: BTreeMap<&str, &FieldValue> = fields
            .iter()
            .filter(|(name, _)| self.schema.field(name).map(|f| f.stored).unwrap_or(false))
            .map(|(name, value)| (*name, value))
            .collect();
        let stored_json = serde_json::to_string(&stored).unwrap_or_else(|_| "{}".to_string());
        let content_hash = format!("{:x}", Sha256::digest(stored_json.as_bytes()));

        let previous: Option<i64> = sqlx::query_scalar("SELECT rowid FROM documents WHERE id = ?")
            .bind(&doc.id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(rowid) = previous {
            sqlx::query("DELETE FROM documents_fts WHERE rowid = ?")
                .bind(rowid)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM documents WHERE rowid = ?")
                .bind(rowid)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM terms WHERE doc_id = ?")
                .bind(&doc.id)
                .execute(&mut *tx)
                .await?;
        }

        let rowid = sqlx::query(
            "INSERT INTO documents (id, doc_type, stored_json, content_hash, indexed_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.doc_type)
        .bind(&stored_json)
        .bind(&content_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut insert = sqlx::query(fts_sql).bind(rowid).bind(&doc.id);
        for name in &self.fts_fields {
            let text = fields
                .get(name.as_str())
                .map(FieldValue::as_text)
                .unwrap_or_default();
            insert = insert.bind(text);
        }
        insert.execute(&mut *tx).await?;

        for spec in self.schema.term_fields() {
            let Some(value) = fields.get(&*spec.name) else {
                continue;
            };
            for term in value.terms() {
                sqlx::query("INSERT INTO terms (doc_id, field, term) VALUES (?, ?, ?)")
                    .bind(&doc.id)
                    .bind(&*spec.name)
                    .bind(term)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        Ok(())
    }
}

/// SQL selecting the ids matching `query`, plus its bind values.
fn matching_ids(query: &CompiledQuery) -> (String, Vec<String>) {
    let mut binds = Vec::new();
    let (mut sql, id_col) = match query.expr.fts5_match() {
        Some(expr) => {
            binds.push(expr);
            (
                "SELECT documents_fts.id AS id FROM documents_fts WHERE documents_fts MATCH ?"
                    .to_string(),
                "documents_fts.id",
            )
        }
        None => {
            let mut sql = "SELECT d.id AS id FROM documents d WHERE 1 = 1".to_string();
            if let Some(exclusion) = query.expr.fts5_exclusion() {
                sql.push_str(
                    " AND d.id NOT IN (SELECT id FROM documents_fts WHERE documents_fts MATCH ?)",
                );
                binds.push(exclusion);
            }
            (sql, "d.id")
        }
    };
    sql.push_str(&filter_sql(query, id_col, &mut binds));
    (sql, binds)
}

fn filter_sql(query: &CompiledQuery, id_col: &str, binds: &mut Vec<String>) -> String {
    let mut sql = String::new();
    for (field, value) in &query.filters {
        sql.push_str(&format!(
            " AND {} IN (SELECT doc_id FROM terms WHERE field = ? AND term = ?)",
            id_col
        ));
        binds.push(field.clone());
        binds.push(value.clone());
    }
    sql
}

impl SqliteIndex {
    async fn fetch_hits(&self, query: &CompiledQuery) -> Result<Vec<SqliteRow>, QueryError> {
        let mut binds = Vec::new();
        let sql = match query.expr.fts5_match() {
            Some(expr) => {
                let snippets: String = query
                    .highlight_fields
                    .iter()
                    .enumerate()
                    .filter_map(|(i, name)| {
                        let column = self.fts_fields.iter().position(|f| f == name)? + 1;
                        Some(format!(
                            ", snippet(documents_fts, {}, '<mark>', '</mark>', '…', 16) AS hl_{}",
                            column, i
                        ))
                    })
                    .collect();
                binds.push(expr);
                let filters = filter_sql(query, "documents_fts.id", &mut binds);
                format!(
                    "SELECT documents_fts.id AS id, documents_fts.rank AS raw_rank, \
                     d.stored_json AS stored_json{} \
                     FROM documents_fts JOIN documents d ON d.rowid = documents_fts.rowid \
                     WHERE documents_fts MATCH ?{} \
                     ORDER BY documents_fts.rank, documents_fts.id LIMIT ? OFFSET ?",
                    snippets, filters
                )
            }
            None => {
                let (ids, id_binds) = matching_ids(query);
                binds = id_binds;
                format!(
                    "SELECT d.id AS id, 0.0 AS raw_rank, d.stored_json AS stored_json \
                     FROM documents d WHERE d.id IN ({}) \
                     ORDER BY d.id LIMIT ? OFFSET ?",
                    ids
                )
            }
        };

        let mut q = sqlx::query(&sql);
        for b in &binds {
            q = q.bind(b);
        }
        q.bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(query_backend)
    }

    async fn count_matches(&self, query: &CompiledQuery) -> Result<u64, QueryError> {
        let (ids, binds) = matching_ids(query);
        let sql = format!("SELECT COUNT(*) FROM ({})", ids);
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for b in &binds {
            q = q.bind(b);
        }
        let n = q.fetch_one(&self.pool).await.map_err(query_backend)?;
        Ok(n as u64)
    }

    async fn facet(
        &self,
        query: &CompiledQuery,
        field: &str,
        top_n: usize,
    ) -> Result<FacetResult, QueryError> {
        let (ids, binds) = matching_ids(query);

        let missing_sql = format!(
            "SELECT COUNT(*) FROM ({}) m WHERE NOT EXISTS \
             (SELECT 1 FROM terms t WHERE t.doc_id = m.id AND t.field = ?)",
            ids
        );
        let mut q = sqlx::query_scalar::<_, i64>(&missing_sql);
        for b in &binds {
            q = q.bind(b);
        }
        let missing = q
            .bind(field)
            .fetch_one(&self.pool)
            .await
            .map_err(query_backend)?;

        let sql = format!(
            "SELECT t.term AS term, COUNT(*) AS n FROM terms t \
             WHERE t.field = ? AND t.doc_id IN ({}) GROUP BY t.term",
            ids
        );
        let mut q = sqlx::query(&sql).bind(field);
        for b in &binds {
            q = q.bind(b);
        }
        let counts: Vec<(String, u64)> = q
            .fetch_all(&self.pool)
            .await
            .map_err(query_backend)?
            .iter()
            .map(|row| {
                let n: i64 = row.get("n");
                (row.get("term"), n as u64)
            })
            .collect();

        Ok(FacetResult::from_counts(field, counts, missing as u64, top_n))
    }
}

#[async_trait]
impl SearchIndex for SqliteIndex {
    fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    async fn write_batch(&self, docs: &[IndexDocument]) -> Result<(), IndexError> {
        let fts_sql = self.fts_insert_sql();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(index_backend)?;
        for doc in docs {
            self.upsert(&mut tx, doc, &fts_sql, now)
                .await
                .map_err(|e| IndexError::Backend(format!("writing {}: {}", doc.id, e)))?;
        }
        tx.commit().await.map_err(index_backend)?;
        Ok(())
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<SearchResult, QueryError> {
        let total_hits = self.count_matches(query).await?;
        let facet = match &query.facet {
            Some(f) => Some(self.facet(query, &f.field, f.top_n).await?),
            None => None,
        };
        let rows = self.fetch_hits(query).await?;
        let expression = query
            .expr
            .fts5_match()
            .unwrap_or_else(|| "match-all".to_string());

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw_rank: f64 = row.get("raw_rank");
            let stored_json: String = row.get("stored_json");
            let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&stored_json)
                .map_err(|e| QueryError::Backend(format!("corrupt stored fields: {}", e)))?;

            let mut fragments = BTreeMap::new();
            for (i, name) in query.highlight_fields.iter().enumerate() {
                let Ok(fragment) = row.try_get::<String, _>(format!("hl_{}", i).as_str()) else {
                    continue;
                };
                if fragment.contains("<mark>") {
                    fragments.insert(name.clone(), vec![fragment]);
                }
            }

            hits.push(Hit {
                id: row.get("id"),
                score: -raw_rank,
                fields,
                fragments,
                explanation: query.explain.then(|| Explanation {
                    engine: "sqlite-fts5 bm25".to_string(),
                    expression: expression.clone(),
                    raw_rank,
                }),
            });
        }

        Ok(SearchResult {
            total_hits,
            offset: query.offset,
            limit: query.limit,
            hits,
            facet,
        })
    }

    async fn document_count(&self) -> Result<u64, QueryError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(query_backend)?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archdex_core::query::{search, FacetRequest, SearchRequest};
    use archdex_core::schema::accession_schema;

    fn doc(id: &str, title: &str, subjects: &[&str]) -> IndexDocument {
        let mut doc = IndexDocument::new(id);
        doc.title = title.to_string();
        doc.content_description = format!("Records described as {}", title.to_lowercase());
        doc.subjects = subjects.iter().map(|s| s.to_string()).collect();
        doc.publish = true;
        doc
    }

    async fn seeded(dir: &Path) -> SqliteIndex {
        let (index, state) = SqliteIndex::open_or_create(&dir.join("idx.archdex"), &accession_schema())
            .await
            .unwrap();
        assert_eq!(state, IndexState::Created);
        index
            .write_batch(&[
                doc("/a/1", "Observatory correspondence", &["Astronomy", "Correspondence"]),
                doc("/a/2", "Eclipse photographs", &["Astronomy", "Photography"]),
                doc("/a/3", "Garden plans", &[]),
            ])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn stemmed_match_with_highlight() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded(dir.path()).await;

        let mut req = SearchRequest::new("photograph");
        req.highlight_fields = vec!["title".into()];
        req.explain = true;
        let result = search(&index, &req).await.unwrap();

        assert_eq!(result.total_hits, 1);
        let hit = &result.hits[0];
        assert_eq!(hit.id, "/a/2");
        assert!(hit.score > 0.0);
        assert_eq!(hit.text("title").as_deref(), Some("Eclipse photographs"));
        assert!(hit.fragments["title"][0].contains("<mark>photographs</mark>"));
        assert!(hit.explanation.is_some());
    }

    #[tokio::test]
    async fn upsert_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded(dir.path()).await;

        index
            .write_batch(&[doc("/a/1", "Ledger volumes", &["Finance"])])
            .await
            .unwrap();

        assert_eq!(index.document_count().await.unwrap(), 3);
        let stale = search(&index, &SearchRequest::new("observatory")).await.unwrap();
        assert_eq!(stale.total_hits, 0);
        let fresh = search(&index, &SearchRequest::new("ledger")).await.unwrap();
        assert_eq!(fresh.hits[0].id, "/a/1");
    }

    #[tokio::test]
    async fn facets_count_all_matches() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded(dir.path()).await;

        let mut req = SearchRequest::new("records");
        req.limit = 1;
        req.facet = Some(FacetRequest {
            field: "subjects".into(),
            top_n: 2,
        });
        let result = search(&index, &req).await.unwrap();

        assert_eq!(result.total_hits, 3);
        assert_eq!(result.hits.len(), 1);
        let facet = result.facet.unwrap();
        assert_eq!(facet.buckets[0].value, "Astronomy");
        assert_eq!(facet.buckets[0].count, 2);
        assert_eq!(facet.buckets.len(), 2);
        assert_eq!(facet.total, 4);
        assert_eq!(facet.other, 1);
        assert_eq!(facet.missing, 1);
    }

    #[tokio::test]
    async fn match_all_with_exclusion_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded(dir.path()).await;

        let mut req = SearchRequest::default();
        req.match_all = true;
        req.excluded = vec!["garden".into()];
        let result = search(&index, &req).await.unwrap();
        let ids: Vec<&str> = result.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["/a/1", "/a/2"]);

        let mut req = SearchRequest::new("records");
        req.filters = vec![("subjects".into(), "Photography".into())];
        let result = search(&index, &req).await.unwrap();
        assert_eq!(result.total_hits, 1);
        assert_eq!(result.hits[0].id, "/a/2");
    }

    #[tokio::test]
    async fn reopening_keeps_stored_schema_and_documents() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded(dir.path()).await;
        index.close().await;

        let mut other = accession_schema();
        other.version = 99;
        let (index, state) = SqliteIndex::open_or_create(&dir.path().join("idx.archdex"), &other)
            .await
            .unwrap();
        assert_eq!(state, IndexState::Opened);
        assert_eq!(index.schema().version, 1);
        assert_eq!(index.document_count().await.unwrap(), 3);
        index.close().await;

        let reader = SqliteIndex::open_read_only(&dir.path().join("idx.archdex"))
            .await
            .unwrap();
        assert_eq!(reader.document_count().await.unwrap(), 3);
        assert!(reader.created_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn foreign_file_is_not_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.db");
        let pool = db::connect(&path).await.unwrap();
        sqlx::query("CREATE TABLE unrelated (x INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let err = SqliteIndex::open_or_create(&path, &accession_schema())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::NotAnIndex { .. }));
    }

    #[tokio::test]
    async fn empty_database_file_becomes_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.archdex");
        db::connect(&path).await.unwrap().close().await;
        assert!(path.exists());

        let (index, state) = SqliteIndex::open_or_create(&path, &accession_schema())
            .await
            .unwrap();
        assert_eq!(state, IndexState::Created);
        assert_eq!(index.document_count().await.unwrap(), 0);
        index.close().await;
    }
}
