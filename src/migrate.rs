//! Index table creation.
//!
//! A new index is laid out from its [`IndexSchema`]:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `documents` | One row per document: id, type, stored field values as JSON |
//! | `documents_fts` | FTS5 table, one column per full-text field |
//! | `terms` | One row per value of every facetable / keyword field |
//! | `index_meta` | The schema JSON and creation time |
//!
//! Tables are never altered afterwards: a schema change means a rebuild.

use anyhow::Result;
use sqlx::SqlitePool;

use archdex_core::schema::IndexSchema;

/// FTS5 tokenizer for English fields: stemmed, case- and accent-folded.
pub const ENGLISH_TOKENIZER: &str = "porter unicode61 remove_diacritics 2";

/// Create every index table for `schema` and record the schema.
pub async fn create_index_tables(pool: &SqlitePool, schema: &IndexSchema) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            doc_type TEXT NOT NULL,
            stored_json TEXT NOT NULL DEFAULT '{}',
            content_hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS terms (
            doc_id TEXT NOT NULL,
            field TEXT NOT NULL,
            term TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(&mut *tx)
    .await?;

    if !fts_exists {
        sqlx::query(&fts_table_sql(schema)).execute(&mut *tx).await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_terms_field_term ON terms(field, term)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_terms_doc_id ON terms(doc_id)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_doc_type ON documents(doc_type)")
        .execute(&mut *tx)
        .await?;

    let now = chrono::Utc::now().to_rfc3339();
    for (key, value) in [("schema", schema.to_json()), ("created_at", now)] {
        sqlx::query("INSERT OR IGNORE INTO index_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

fn fts_table_sql(schema: &IndexSchema) -> String {
    let mut columns = vec!["id UNINDEXED".to_string()];
    columns.extend(schema.full_text_fields().map(|f| format!("\"{}\"", f.name)));
    format!(
        "CREATE VIRTUAL TABLE documents_fts USING fts5({}, tokenize='{}')",
        columns.join(", "),
        ENGLISH_TOKENIZER
    )
}

/// Read the schema an index was created with. `None` if the database holds
/// no archdex index.
pub async fn stored_schema(pool: &SqlitePool) -> Result<Option<String>> {
    let has_meta: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='index_meta'",
    )
    .fetch_one(pool)
    .await?;
    if !has_meta {
        return Ok(None);
    }

    let schema: Option<String> =
        sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'schema'")
            .fetch_optional(pool)
            .await?;
    Ok(schema)
}

/// `true` when the database holds no tables at all.
pub async fn is_empty_database(pool: &SqlitePool) -> Result<bool> {
    let tables: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type='table'")
        .fetch_one(pool)
        .await?;
    Ok(tables == 0)
}
