//! Index statistics.
//!
//! `archdex stats` summarizes an index: document counts, creation time, file
//! size and the fields of the schema it was created with.

use anyhow::Result;

use archdex_core::store::SearchIndex;

use crate::config::Config;
use crate::sqlite_index::SqliteIndex;

pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::open_read_only(&config.index.path).await?;

    let total = index.document_count().await?;
    let by_type = index.counts_by_type().await?;
    let created_at = index.created_at().await?;
    let size = std::fs::metadata(index.path()).map(|m| m.len()).unwrap_or(0);

    println!("archdex index stats");
    println!("===================");
    println!();
    println!("  Index:       {}", index.path().display());
    println!("  Size:        {}", format_bytes(size));
    if let Some(created) = created_at {
        println!("  Created:     {}", format_created(&created));
    }
    println!();
    println!("  Documents:   {}", total);
    for (doc_type, n) in &by_type {
        println!("    {:<12} {}", doc_type, n);
    }

    let schema = index.schema();
    println!();
    println!("  Schema:      {} (version {})", schema.doc_type, schema.version);
    println!(
        "  {:<26} {:<8} {:<7} {:<8} {}",
        "FIELD", "ANALYZER", "STORED", "INDEXED", "TERMS"
    );
    println!("  {}", "-".repeat(60));
    for field in &schema.fields {
        println!(
            "  {:<26} {:<8} {:<7} {:<8} {}",
            field.name,
            format!("{:?}", field.analyzer).to_lowercase(),
            yes_no(field.stored),
            yes_no(field.indexed),
            yes_no(field.keeps_terms()),
        );
    }
    println!();

    index.close().await;
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// `2026-10-19 14:02 (3 hours ago)` from an RFC 3339 timestamp.
fn format_created(rfc3339: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(rfc3339) {
        Ok(dt) => format!(
            "{} ({})",
            dt.format("%Y-%m-%d %H:%M"),
            format_relative(dt.timestamp(), chrono::Utc::now().timestamp())
        ),
        Err(_) => rfc3339.to_string(),
    }
}

fn format_relative(ts: i64, now: i64) -> String {
    let delta = now - ts;
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
