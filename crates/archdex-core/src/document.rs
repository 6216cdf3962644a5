//! Typed index documents.
//!
//! An [`IndexDocument`] is the flattened form of a
//! [`NormalizedView`] handed to the index. Every field is
//! a named struct member, so a field the schema does not declare is caught by
//! [`IndexDocument::validate`] rather than silently dropped by the engine.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::models::AgentRole;
use crate::resolve::{NormalizedView, Resolved};
use crate::schema::{IndexSchema, ACCESSION_DOC_TYPE};

/// Value of one document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Individual values, as faceted and filtered on.
    pub fn terms(&self) -> Vec<String> {
        match self {
            FieldValue::Bool(b) => vec![b.to_string()],
            FieldValue::Text(s) if s.is_empty() => Vec::new(),
            FieldValue::Text(s) => vec![s.clone()],
            FieldValue::List(items) => items.iter().filter(|s| !s.is_empty()).cloned().collect(),
        }
    }

    /// Full-text rendering, list items one per line.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Bool(_) => false,
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::List(items) => items.iter().all(String::is_empty),
        }
    }
}

/// One accession as submitted to the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub identifier: Option<String>,
    pub title: String,
    pub content_description: String,
    pub condition_description: String,
    pub subjects: Vec<String>,
    pub subjects_topical: Vec<String>,
    pub subjects_function: Vec<String>,
    pub extents: Vec<String>,
    pub linked_agents_creators: Vec<String>,
    pub linked_agents_subjects: Vec<String>,
    pub linked_agents_sources: Vec<String>,
    pub digital_object_titles: Vec<String>,
    pub digital_object_file_uris: Vec<String>,
    pub accession_date: Option<String>,
    pub date_expression: Vec<String>,
    pub publish: bool,
    pub unresolved_refs: Vec<String>,
}

impl IndexDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doc_type: ACCESSION_DOC_TYPE.to_string(),
            ..Default::default()
        }
    }

    /// Flatten a normalized view. Unresolved references are listed in
    /// `unresolved_refs` and contribute nothing to the text fields.
    pub fn from_view(view: &NormalizedView) -> Self {
        let mut doc = Self::new(view.uri.clone());
        doc.identifier = view.identifier.clone();
        doc.title = view.title.clone();
        doc.content_description = view.content_description.clone();
        doc.condition_description = view.condition_description.clone();
        doc.accession_date = view.accession_date.clone();
        doc.publish = view.publish;
        doc.extents = view
            .extents
            .iter()
            .map(|e| e.label())
            .filter(|l| !l.is_empty())
            .collect();
        doc.date_expression = view
            .dates
            .iter()
            .map(|d| d.display())
            .filter(|d| !d.is_empty())
            .collect();

        for subject in view.subjects.iter().filter_map(Resolved::inlined) {
            doc.subjects.push(subject.title.clone());
            match subject.term_type() {
                Some("topical") => doc.subjects_topical.push(subject.title.clone()),
                Some("function") => doc.subjects_function.push(subject.title.clone()),
                _ => {}
            }
        }

        for object in view.digital_objects.iter().filter_map(Resolved::inlined) {
            if !object.title.is_empty() {
                doc.digital_object_titles.push(object.title.clone());
            }
            doc.digital_object_file_uris
                .extend(object.file_uris().map(str::to_string));
        }

        for linked in view.linked_agents.iter().filter_map(Resolved::inlined) {
            let name = linked.agent.display_title().to_string();
            if name.is_empty() {
                continue;
            }
            match linked.role {
                AgentRole::Creator => doc.linked_agents_creators.push(name),
                AgentRole::Subject => doc.linked_agents_subjects.push(name),
                AgentRole::Source => doc.linked_agents_sources.push(name),
                AgentRole::Other(_) => {}
            }
        }

        doc.unresolved_refs = view
            .unresolved()
            .map(|missing| missing.uri.to_string())
            .collect();

        doc
    }

    /// Non-empty fields by schema name, in declaration order of the struct.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        let text = |s: &String| FieldValue::Text(s.clone());
        let list = |v: &Vec<String>| FieldValue::List(v.clone());

        let all = [
            ("type", text(&self.doc_type)),
            (
                "identifier",
                FieldValue::Text(self.identifier.clone().unwrap_or_default()),
            ),
            ("title", text(&self.title)),
            ("content_description", text(&self.content_description)),
            ("condition_description", text(&self.condition_description)),
            ("subjects", list(&self.subjects)),
            ("subjects_topical", list(&self.subjects_topical)),
            ("subjects_function", list(&self.subjects_function)),
            ("extents", list(&self.extents)),
            ("linked_agents_creators", list(&self.linked_agents_creators)),
            ("linked_agents_subjects", list(&self.linked_agents_subjects)),
            ("linked_agents_sources", list(&self.linked_agents_sources)),
            ("digital_object_titles", list(&self.digital_object_titles)),
            ("digital_object_file_uris", list(&self.digital_object_file_uris)),
            (
                "accession_date",
                FieldValue::Text(self.accession_date.clone().unwrap_or_default()),
            ),
            ("date_expression", list(&self.date_expression)),
            ("publish", FieldValue::Bool(self.publish)),
            ("unresolved_refs", list(&self.unresolved_refs)),
        ];

        all.into_iter().filter(|(_, v)| !v.is_empty()).collect()
    }

    /// Reject documents carrying a field the schema does not declare.
    pub fn validate(&self, schema: &IndexSchema) -> Result<(), SchemaError> {
        for (name, _) in self.fields() {
            if !schema.declares(name) {
                return Err(SchemaError::UndeclaredField {
                    id: self.id.clone(),
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, AgentLink, Extent, Reference, Subject, Term};
    use crate::resolve::EntityMaps;
    use crate::schema::{accession_schema, FieldSpec};

    fn subject(uri: &str, title: &str, term_type: &str) -> Subject {
        Subject {
            uri: uri.into(),
            title: title.into(),
            publish: true,
            source: None,
            scope_note: None,
            terms: vec![Term {
                term: title.into(),
                term_type: term_type.into(),
            }],
        }
    }

    fn view() -> NormalizedView {
        let maps = EntityMaps {
            subjects: [
                subject("/subjects/1", "Astronomy", "topical"),
                subject("/subjects/2", "Correspondence", "function"),
                subject("/subjects/3", "Pasadena (Calif.)", "geographic"),
            ]
            .into_iter()
            .collect(),
            digital_objects: Default::default(),
            agents: [Agent {
                uri: "/agents/people/1".into(),
                title: "Hale, George Ellery".into(),
                agent_type: "agent_person".into(),
                publish: true,
                display_name: None,
                names: Vec::new(),
            }]
            .into_iter()
            .collect(),
        };

        let accession = crate::models::Accession {
            uri: "/repositories/2/accessions/7".into(),
            title: "Hale papers".into(),
            id_0: Some("1986".into()),
            id_1: None,
            id_2: None,
            id_3: None,
            content_description: "Letters on solar observation".into(),
            condition_description: String::new(),
            accession_date: None,
            publish: true,
            suppressed: false,
            subjects: ["/subjects/1", "/subjects/2", "/subjects/3", "/subjects/9"]
                .into_iter()
                .map(Reference::new)
                .collect(),
            digital_objects: Vec::new(),
            linked_agents: vec![AgentLink {
                uri: "/agents/people/1".into(),
                role: AgentRole::Creator,
                relator: None,
            }],
            extents: vec![Extent {
                number: "3".into(),
                extent_type: "cubic_feet".into(),
                ..Default::default()
            }],
            dates: Vec::new(),
            instances: Vec::new(),
        };

        maps.normalize(&accession)
    }

    #[test]
    fn flattens_resolved_references() {
        let doc = IndexDocument::from_view(&view());
        assert_eq!(doc.id, "/repositories/2/accessions/7");
        assert_eq!(doc.doc_type, "accession");
        assert_eq!(
            doc.subjects,
            vec!["Astronomy", "Correspondence", "Pasadena (Calif.)"]
        );
        assert_eq!(doc.subjects_topical, vec!["Astronomy"]);
        assert_eq!(doc.subjects_function, vec!["Correspondence"]);
        assert_eq!(doc.linked_agents_creators, vec!["Hale, George Ellery"]);
        assert_eq!(doc.extents, vec!["3 cubic feet"]);
        assert_eq!(doc.unresolved_refs, vec!["/subjects/9"]);
    }

    #[test]
    fn fields_skip_empty_values() {
        let doc = IndexDocument::from_view(&view());
        let names: Vec<&str> = doc.fields().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"title"));
        assert!(names.contains(&"publish"));
        assert!(!names.contains(&"condition_description"));
        assert!(!names.contains(&"digital_object_titles"));
    }

    #[test]
    fn validates_against_schema() {
        let doc = IndexDocument::from_view(&view());
        doc.validate(&accession_schema()).unwrap();

        let narrow = IndexSchema {
            doc_type: "accession".into(),
            version: 1,
            fields: vec![FieldSpec::keyword("type"), FieldSpec::text("title")],
        };
        let err = doc.validate(&narrow).unwrap_err();
        assert!(matches!(err, SchemaError::UndeclaredField { .. }));
    }

    #[test]
    fn field_value_terms() {
        assert_eq!(FieldValue::Bool(true).terms(), vec!["true"]);
        assert!(FieldValue::Text(String::new()).terms().is_empty());
        assert_eq!(
            FieldValue::List(vec!["a".into(), String::new(), "b".into()]).terms(),
            vec!["a", "b"]
        );
        assert_eq!(
            FieldValue::List(vec!["a".into(), "b".into()]).as_text(),
            "a\nb"
        );
    }
}
