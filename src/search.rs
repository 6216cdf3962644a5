//! `archdex search`: query the index and print results.
//!
//! Options left unset fall back to the `[search]` section of the
//! configuration (window size, highlight fields, facet field and size).

use anyhow::{bail, Result};

use archdex_core::query::{search, FacetRequest, Hit, SearchRequest, SearchResult};

use crate::config::Config;
use crate::progress::format_number;
use crate::sqlite_index::SqliteIndex;

/// Command-line search options, before configuration defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub terms: Vec<String>,
    pub required: Vec<String>,
    pub exact: Option<String>,
    pub exclude: Vec<String>,
    pub all: bool,
    pub filters: Vec<String>,
    pub from: i64,
    pub size: Option<i64>,
    pub facet: Option<String>,
    pub facet_size: Option<usize>,
    pub highlight: Vec<String>,
    pub explain: bool,
    pub json: bool,
}

fn parse_filter(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => bail!("invalid filter '{}', expected field=value", raw),
    }
}

impl SearchOptions {
    /// Resolve against configuration defaults into a [`SearchRequest`].
    pub fn to_request(&self, config: &Config) -> Result<SearchRequest> {
        let highlight_fields = if self.highlight.is_empty() {
            config.search.highlight_fields.clone()
        } else {
            self.highlight.clone()
        };

        let facet_field = self
            .facet
            .clone()
            .unwrap_or_else(|| config.search.facet_field.clone());
        let facet = (!facet_field.is_empty()).then(|| FacetRequest {
            field: facet_field,
            top_n: self.facet_size.unwrap_or(config.search.facet_size),
        });

        Ok(SearchRequest {
            text: self.terms.join(" "),
            required: self.required.clone(),
            exact: self.exact.clone(),
            excluded: self.exclude.clone(),
            match_all: self.all,
            filters: self
                .filters
                .iter()
                .map(|f| parse_filter(f))
                .collect::<Result<_>>()?,
            offset: self.from,
            limit: self
                .size
                .unwrap_or(config.search.default_size as i64),
            highlight_fields,
            facet,
            explain: self.explain,
        })
    }
}

pub async fn run_search(config: &Config, options: &SearchOptions) -> Result<()> {
    let request = options.to_request(config)?;
    let index = SqliteIndex::open_read_only(&config.index.path).await?;
    let outcome = search(&index, &request).await;
    index.close().await;
    let result = outcome?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_human(&result);
    }
    Ok(())
}

fn print_human(result: &SearchResult) {
    if result.hits.is_empty() {
        println!("No results.");
    } else {
        println!(
            "{} hits (showing {}-{})",
            format_number(result.total_hits),
            result.offset + 1,
            result.offset + result.hits.len()
        );
        println!();
        for (i, hit) in result.hits.iter().enumerate() {
            print_hit(result.offset + i + 1, hit);
        }
    }

    if let Some(facet) = &result.facet {
        println!("{}:", facet.field);
        for bucket in &facet.buckets {
            println!("  {:>6}  {}", bucket.count, bucket.value);
        }
        if facet.other > 0 {
            println!("  {:>6}  (other)", facet.other);
        }
        if facet.missing > 0 {
            println!("  {:>6}  (missing)", facet.missing);
        }
    }
}

fn print_hit(rank: usize, hit: &Hit) {
    let title = hit.text("title").unwrap_or_default();
    match hit.text("identifier") {
        Some(identifier) => println!("{}. [{:.2}] {} ({})", rank, hit.score, title, identifier),
        None => println!("{}. [{:.2}] {}", rank, hit.score, title),
    }
    for (field, fragments) in &hit.fragments {
        for fragment in fragments {
            println!("    {}: \"{}\"", field, fragment.replace('\n', " ").trim());
        }
    }
    if let Some(explanation) = &hit.explanation {
        println!(
            "    explain: {} match {} rank {:.4}",
            explanation.engine, explanation.expression, explanation.raw_rank
        );
    }
    println!("    id: {}", hit.id);
    println!();
}
