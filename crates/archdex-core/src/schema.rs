//! Field-level index configuration.
//!
//! An [`IndexSchema`] is declared once and handed to the indexer when an
//! index is first created. It is persisted alongside the index and never
//! migrated in place: changing it means rebuilding the index.
//!
//! | Analyzer | Behaviour |
//! |----------|-----------|
//! | [`Analyzer::English`] | Tokenized, lowercased, stemmed full text |
//! | [`Analyzer::Keyword`] | The whole value is one verbatim term |
//!
//! Fields with `term_vectors` (and indexed keyword fields) keep one term per
//! value so they can be faceted and filtered on.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

use crate::error::SchemaError;

/// Document type discriminator for accession views.
pub const ACCESSION_DOC_TYPE: &str = "accession";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    English,
    Keyword,
}

/// Indexing configuration for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: Cow<'static, str>,
    pub analyzer: Analyzer,
    /// Value is retrievable from search hits.
    pub stored: bool,
    /// Value is searchable.
    pub indexed: bool,
    /// Per-value terms are retained for faceting and highlighting precision.
    pub term_vectors: bool,
}

impl FieldSpec {
    /// Stored, indexed English text.
    pub fn text(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            analyzer: Analyzer::English,
            stored: true,
            indexed: true,
            term_vectors: false,
        }
    }

    /// Stored, indexed verbatim value.
    pub fn keyword(name: &'static str) -> Self {
        Self {
            analyzer: Analyzer::Keyword,
            ..Self::text(name)
        }
    }

    pub fn with_term_vectors(mut self) -> Self {
        self.term_vectors = true;
        self
    }

    /// Retrievable but not searchable.
    pub fn stored_only(mut self) -> Self {
        self.indexed = false;
        self
    }

    /// Participates in free-text matching.
    pub fn is_full_text(&self) -> bool {
        self.indexed && self.analyzer == Analyzer::English
    }

    /// Keeps one term per value (facets and exact filters).
    pub fn keeps_terms(&self) -> bool {
        self.indexed && (self.term_vectors || self.analyzer == Analyzer::Keyword)
    }
}

/// The complete field declaration for one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub doc_type: String,
    pub version: u32,
    pub fields: Vec<FieldSpec>,
}

impl IndexSchema {
    /// Check names are unique and identifier-safe and that at least one
    /// field is searchable as full text.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !is_identifier(&field.name) {
                return Err(SchemaError::InvalidFieldName(field.name.to_string()));
            }
            if !seen.insert(&*field.name) {
                return Err(SchemaError::DuplicateField(field.name.to_string()));
            }
        }
        if !self.fields.iter().any(FieldSpec::is_full_text) {
            return Err(SchemaError::NoSearchableFields);
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Full-text fields in declaration order.
    pub fn full_text_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_full_text())
    }

    pub fn term_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.keeps_terms())
    }

    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.stored)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: IndexSchema =
            serde_json::from_str(json).map_err(|e| SchemaError::Unreadable(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Schema for normalized accession views.
pub fn accession_schema() -> IndexSchema {
    IndexSchema {
        doc_type: ACCESSION_DOC_TYPE.to_string(),
        version: 1,
        fields: vec![
            FieldSpec::keyword("type"),
            FieldSpec::keyword("identifier"),
            FieldSpec::text("title"),
            FieldSpec::text("content_description"),
            FieldSpec::text("condition_description"),
            FieldSpec::text("subjects").with_term_vectors(),
            FieldSpec::text("subjects_topical").with_term_vectors(),
            FieldSpec::text("subjects_function").with_term_vectors(),
            FieldSpec::text("extents"),
            FieldSpec::text("linked_agents_creators").with_term_vectors(),
            FieldSpec::text("linked_agents_subjects").with_term_vectors(),
            FieldSpec::text("linked_agents_sources").with_term_vectors(),
            FieldSpec::text("digital_object_titles").stored_only(),
            FieldSpec::keyword("digital_object_file_uris").stored_only(),
            FieldSpec::text("accession_date").stored_only(),
            FieldSpec::text("date_expression").stored_only(),
            FieldSpec::keyword("publish").with_term_vectors(),
            FieldSpec::keyword("unresolved_refs").stored_only(),
        ],
    }
}
