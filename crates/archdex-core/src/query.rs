//! Query shaping: parameter validation, free-text parsing and result types.
//!
//! Ranking belongs to the engine behind [`SearchIndex`]. This module only
//! turns a [`SearchRequest`] into a [`CompiledQuery`] the engine can run:
//!
//! 1. Parse the free text into required, optional and excluded clauses.
//! 2. Clamp the result window (`offset < 0` → 0, `limit <= 0` →
//!    [`DEFAULT_LIMIT`]).
//! 3. Check highlight, facet and filter fields against the index schema.
//!
//! # Free-text grammar
//!
//! | Input | Meaning |
//! |-------|---------|
//! | `solar` | optional term |
//! | `+solar` | required term |
//! | `-eclipse` | excluded term |
//! | `"solar eclipse"` | phrase (may also be prefixed with `+` or `-`) |
//!
//! When any clause is required, optional clauses are ignored; otherwise at
//! least one optional clause must match.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::document::FieldValue;
use crate::error::QueryError;
use crate::schema::IndexSchema;
use crate::store::SearchIndex;

/// Window size used when the caller asks for zero or fewer hits.
pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetRequest {
    pub field: String,
    pub top_n: usize,
}

/// Everything a caller can ask of the query service.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Free text in the grammar described at module level.
    pub text: String,
    /// Terms every hit must contain.
    pub required: Vec<String>,
    /// A phrase every hit must contain.
    pub exact: Option<String>,
    /// Terms no hit may contain.
    pub excluded: Vec<String>,
    /// Match every document when no positive clause is given.
    pub match_all: bool,
    /// Exact `(field, value)` constraints on term fields.
    pub filters: Vec<(String, String)>,
    pub offset: i64,
    pub limit: i64,
    pub highlight_fields: Vec<String>,
    pub facet: Option<FacetRequest>,
    pub explain: bool,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Clause {
    Term(String),
    Phrase(String),
}

impl Clause {
    pub fn text(&self) -> &str {
        match self {
            Clause::Term(t) | Clause::Phrase(t) => t,
        }
    }

    /// FTS5 string literal for this clause.
    fn quoted(&self) -> String {
        format!("\"{}\"", self.text().replace('"', "\"\""))
    }

    fn from_words(words: &str) -> Option<Clause> {
        let words = words.split_whitespace().collect::<Vec<_>>().join(" ");
        if !words.chars().any(char::is_alphanumeric) {
            return None;
        }
        if words.contains(' ') {
            Some(Clause::Phrase(words))
        } else {
            Some(Clause::Term(words))
        }
    }
}

/// Parsed form of the free text plus the structured request fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryExpr {
    pub should: Vec<Clause>,
    pub must: Vec<Clause>,
    pub must_not: Vec<Clause>,
    pub match_all: bool,
}

impl QueryExpr {
    /// Parse free text. Does not check that anything positive remains.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let mut expr = QueryExpr::default();
        let mut chars = text.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            let Some(&first) = chars.peek() else { break };

            let target = match first {
                '+' => {
                    chars.next();
                    &mut expr.must
                }
                '-' => {
                    chars.next();
                    &mut expr.must_not
                }
                _ => &mut expr.should,
            };

            let clause = if chars.next_if_eq(&'"').is_some() {
                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }
                if !closed {
                    return Err(QueryError::Malformed(format!(
                        "unterminated quote in \"{}\"",
                        text
                    )));
                }
                Clause::from_words(&phrase)
            } else {
                let mut word = String::new();
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    word.push(c);
                }
                Clause::from_words(&word)
            };

            if let Some(clause) = clause {
                target.push(clause);
            }
        }

        Ok(expr)
    }

    /// Combine the free text with the request's structured fields and
    /// require at least one positive clause (or `match_all`).
    pub fn from_request(req: &SearchRequest) -> Result<Self, QueryError> {
        let mut expr = Self::parse(&req.text)?;
        expr.must.extend(
            req.required
                .iter()
                .flat_map(|t| t.split_whitespace())
                .filter_map(Clause::from_words),
        );
        if let Some(phrase) = req.exact.as_deref().and_then(Clause::from_words) {
            expr.must.push(match phrase {
                Clause::Term(t) => Clause::Phrase(t),
                p => p,
            });
        }
        expr.must_not.extend(
            req.excluded
                .iter()
                .flat_map(|t| t.split_whitespace())
                .filter_map(Clause::from_words),
        );
        expr.match_all = req.match_all;

        if !expr.has_positive() && !expr.match_all {
            return Err(QueryError::Malformed(
                "query has no search terms (use match-all to list every document)".to_string(),
            ));
        }
        Ok(expr)
    }

    pub fn has_positive(&self) -> bool {
        !self.must.is_empty() || !self.should.is_empty()
    }

    /// Clauses that decide whether a document matches.
    pub fn positive(&self) -> &[Clause] {
        if self.must.is_empty() {
            &self.should
        } else {
            &self.must
        }
    }

    /// FTS5 MATCH expression, or `None` in match-all mode.
    pub fn fts5_match(&self) -> Option<String> {
        if !self.has_positive() {
            return None;
        }
        let joiner = if self.must.is_empty() { " OR " } else { " AND " };
        let positive: Vec<String> = self.positive().iter().map(Clause::quoted).collect();
        let mut out = format!("({})", positive.join(joiner));
        for clause in &self.must_not {
            out.push_str(" NOT ");
            out.push_str(&clause.quoted());
        }
        Some(out)
    }

    /// FTS5 expression matching any excluded clause, for match-all mode.
    pub fn fts5_exclusion(&self) -> Option<String> {
        if self.must_not.is_empty() {
            return None;
        }
        let any: Vec<String> = self.must_not.iter().map(Clause::quoted).collect();
        Some(any.join(" OR "))
    }
}

/// `offset < 0` → 0; `limit <= 0` → [`DEFAULT_LIMIT`].
pub fn clamp_window(offset: i64, limit: i64) -> (usize, usize) {
    let offset = offset.max(0) as usize;
    let limit = if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit as usize
    };
    (offset, limit)
}

/// A validated request, ready for [`SearchIndex::execute`].
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub expr: QueryExpr,
    pub filters: Vec<(String, String)>,
    pub offset: usize,
    pub limit: usize,
    pub highlight_fields: Vec<String>,
    pub facet: Option<FacetRequest>,
    pub explain: bool,
}

pub fn compile(req: &SearchRequest, schema: &IndexSchema) -> Result<CompiledQuery, QueryError> {
    let expr = QueryExpr::from_request(req)?;
    let (offset, limit) = clamp_window(req.offset, req.limit);

    let mut highlight_fields: Vec<String> = Vec::new();
    for name in &req.highlight_fields {
        let field = schema
            .field(name)
            .ok_or_else(|| QueryError::UnknownField(name.clone()))?;
        if !(field.stored && field.is_full_text()) {
            return Err(QueryError::FieldNotHighlightable(name.clone()));
        }
        if !highlight_fields.contains(name) {
            highlight_fields.push(name.clone());
        }
    }

    let check_term_field = |name: &str| -> Result<(), QueryError> {
        let field = schema
            .field(name)
            .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
        if field.keeps_terms() {
            Ok(())
        } else {
            Err(QueryError::FieldNotFacetable(name.to_string()))
        }
    };

    let facet = match &req.facet {
        Some(facet) => {
            check_term_field(&facet.field)?;
            Some(FacetRequest {
                field: facet.field.clone(),
                top_n: facet.top_n.max(1),
            })
        }
        None => None,
    };

    for (field, _) in &req.filters {
        check_term_field(field)?;
    }

    Ok(CompiledQuery {
        expr,
        filters: req.filters.clone(),
        offset,
        limit,
        highlight_fields,
        facet,
        explain: req.explain,
    })
}

/// Validate `req` against the index's schema and run it.
pub async fn search<I: SearchIndex + ?Sized>(
    index: &I,
    req: &SearchRequest,
) -> Result<SearchResult, QueryError> {
    let compiled = compile(req, index.schema())?;
    index.execute(&compiled).await
}

// ============ Results ============

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Matches before windowing.
    pub total_hits: u64,
    pub offset: usize,
    pub limit: usize,
    pub hits: Vec<Hit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet: Option<FacetResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub id: String,
    pub score: f64,
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fragments: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

impl Hit {
    /// Stored value of `field` rendered as text.
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).map(FieldValue::as_text)
    }
}

/// How the engine arrived at a hit's score.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub engine: String,
    pub expression: String,
    pub raw_rank: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetResult {
    pub field: String,
    /// Value occurrences across all matching documents.
    pub total: u64,
    /// Matching documents without any value for the field.
    pub missing: u64,
    /// Occurrences not covered by the returned buckets.
    pub other: u64,
    pub buckets: Vec<FacetBucket>,
}

impl FacetResult {
    /// Keep the `top_n` most frequent values, ties broken by value.
    pub fn from_counts(
        field: &str,
        counts: impl IntoIterator<Item = (String, u64)>,
        missing: u64,
        top_n: usize,
    ) -> Self {
        let mut buckets: Vec<FacetBucket> = counts
            .into_iter()
            .map(|(value, count)| FacetBucket { value, count })
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

        let total: u64 = buckets.iter().map(|b| b.count).sum();
        buckets.truncate(top_n);
        let shown: u64 = buckets.iter().map(|b| b.count).sum();

        FacetResult {
            field: field.to_string(),
            total,
            missing,
            other: total - shown,
            buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::accession_schema;

    fn term(t: &str) -> Clause {
        Clause::Term(t.to_string())
    }

    #[test]
    fn required_and_excluded_entries_split_into_terms() {
        let req = SearchRequest {
            required: vec!["hale  solar".into()],
            excluded: vec!["draft copy".into()],
            exact: Some("mount wilson".into()),
            ..Default::default()
        };
        let expr = QueryExpr::from_request(&req).unwrap();
        assert_eq!(
            expr.must,
            vec![
                term("hale"),
                term("solar"),
                Clause::Phrase("mount wilson".into())
            ]
        );
        assert_eq!(expr.must_not, vec![term("draft"), term("copy")]);
        assert_eq!(
            expr.fts5_match().unwrap(),
            r#"("hale" AND "solar" AND "mount wilson") NOT "draft" NOT "copy""#
        );
    }

    #[test]
    fn parses_prefixes_and_phrases() {
        let expr = QueryExpr::parse(r#"solar +hale -eclipse "mount wilson" -"dark  room""#).unwrap();
        assert_eq!(
            expr.should,
            vec![term("solar"), Clause::Phrase("mount wilson".into())]
        );
        assert_eq!(expr.must, vec![term("hale")]);
        assert_eq!(
            expr.must_not,
            vec![term("eclipse"), Clause::Phrase("dark room".into())]
        );
    }

    #[test]
    fn drops_punctuation_only_terms() {
        let expr = QueryExpr::parse("- + ... solar \"\"").unwrap();
        assert_eq!(expr.should, vec![term("solar")]);
        assert!(expr.must.is_empty());
        assert!(expr.must_not.is_empty());
    }

    #[test]
    fn unterminated_quote_is_malformed() {
        let err = QueryExpr::parse(r#"solar "mount wilson"#).unwrap_err();
        assert!(matches!(err, QueryError::Malformed(_)));
    }

    #[test]
    fn negative_only_query_is_malformed_unless_match_all() {
        let mut req = SearchRequest::new("-eclipse");
        assert!(matches!(
            QueryExpr::from_request(&req),
            Err(QueryError::Malformed(_))
        ));

        req.match_all = true;
        let expr = QueryExpr::from_request(&req).unwrap();
        assert_eq!(expr.fts5_match(), None);
        assert_eq!(expr.fts5_exclusion().as_deref(), Some("\"eclipse\""));
    }

    #[test]
    fn structured_fields_join_free_text() {
        let req = SearchRequest {
            text: "letters".into(),
            required: vec!["hale".into()],
            exact: Some("solar observatory".into()),
            excluded: vec!["draft".into()],
            ..Default::default()
        };
        let expr = QueryExpr::from_request(&req).unwrap();
        assert_eq!(
            expr.fts5_match().as_deref(),
            Some(r#"("hale" AND "solar observatory") NOT "draft""#)
        );
    }

    #[test]
    fn optional_terms_are_or_joined_and_quotes_escaped() {
        let expr = QueryExpr::parse(r#"art history 12"inch"#).unwrap();
        assert_eq!(
            expr.fts5_match().as_deref(),
            Some(r#"("art" OR "history" OR "12""inch")"#)
        );
    }

    #[test]
    fn window_clamping() {
        assert_eq!(clamp_window(-5, 20), (0, 20));
        assert_eq!(clamp_window(0, 0), (0, DEFAULT_LIMIT));
        assert_eq!(clamp_window(3, -1), (3, DEFAULT_LIMIT));
        assert_eq!(clamp_window(-5, 0), clamp_window(0, 10));
    }

    #[test]
    fn compile_checks_fields() {
        let schema = accession_schema();

        let mut req = SearchRequest::new("art");
        req.highlight_fields = vec!["title".into(), "title".into(), "subjects".into()];
        req.facet = Some(FacetRequest {
            field: "subjects".into(),
            top_n: 0,
        });
        let compiled = compile(&req, &schema).unwrap();
        assert_eq!(compiled.highlight_fields, vec!["title", "subjects"]);
        assert_eq!(compiled.facet.unwrap().top_n, 1);

        req.highlight_fields = vec!["nope".into()];
        assert!(matches!(
            compile(&req, &schema),
            Err(QueryError::UnknownField(_))
        ));

        req.highlight_fields = vec!["digital_object_titles".into()];
        assert!(matches!(
            compile(&req, &schema),
            Err(QueryError::FieldNotHighlightable(_))
        ));

        req.highlight_fields.clear();
        req.facet = Some(FacetRequest {
            field: "title".into(),
            top_n: 3,
        });
        assert!(matches!(
            compile(&req, &schema),
            Err(QueryError::FieldNotFacetable(_))
        ));

        req.facet = None;
        req.filters = vec![("publish".into(), "true".into())];
        assert!(compile(&req, &schema).is_ok());
    }

    #[test]
    fn facet_buckets_sorted_and_truncated() {
        let facet = FacetResult::from_counts(
            "subjects",
            vec![
                ("History".to_string(), 4),
                ("Art".to_string(), 4),
                ("Maps".to_string(), 1),
                ("Astronomy".to_string(), 7),
            ],
            2,
            3,
        );
        let values: Vec<&str> = facet.buckets.iter().map(|b| b.value.as_str()).collect();
        assert_eq!(values, vec!["Astronomy", "Art", "History"]);
        assert_eq!(facet.total, 16);
        assert_eq!(facet.other, 1);
        assert_eq!(facet.missing, 2);
    }
}
