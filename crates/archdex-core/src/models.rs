//! Archival records as exported by the archive-management platform.
//!
//! Each record is one JSON document identified by its own `uri`. Accessions
//! point at subjects, digital objects, and agents through lightweight
//! [`Reference`]s and [`AgentLink`]s; the resolver replaces those with the
//! entities they name.
//!
//! Only the fields the pipeline reads are modelled. Unknown fields in the
//! exported JSON are ignored.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

/// A record that can be keyed into an [`EntityMap`] by its URI.
pub trait Entity {
    /// Human-readable kind used in log and error messages.
    const KIND: &'static str;

    fn uri(&self) -> &str;
}

// ============ References ============

/// Pointer to another record by URI.
///
/// Exports carry either bare URI strings or `{"ref": "..."}` objects; both
/// deserialize to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawReference")]
pub struct Reference {
    #[serde(rename = "ref")]
    pub uri: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReference {
    Bare(String),
    Link {
        #[serde(rename = "ref", alias = "identifier")]
        uri: String,
    },
}

impl From<RawReference> for Reference {
    fn from(raw: RawReference) -> Self {
        match raw {
            RawReference::Bare(uri) | RawReference::Link { uri } => Reference { uri },
        }
    }
}

impl Reference {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Role an agent plays on an accession.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentRole {
    Creator,
    Subject,
    Source,
    Other(String),
}

impl From<String> for AgentRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "creator" => AgentRole::Creator,
            "subject" => AgentRole::Subject,
            "source" => AgentRole::Source,
            _ => AgentRole::Other(s),
        }
    }
}

impl From<AgentRole> for String {
    fn from(role: AgentRole) -> Self {
        role.to_string()
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Creator => f.write_str("creator"),
            AgentRole::Subject => f.write_str("subject"),
            AgentRole::Source => f.write_str("source"),
            AgentRole::Other(s) => f.write_str(s),
        }
    }
}

impl Default for AgentRole {
    fn default() -> Self {
        AgentRole::Other(String::new())
    }
}

/// Agent pointer with the role tag it carries on the accession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLink {
    #[serde(rename = "ref", alias = "identifier")]
    pub uri: String,
    #[serde(default)]
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relator: Option<String>,
}

/// Container instance on an accession. Digital objects are linked here by
/// the platform's native export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_object: Option<Reference>,
}

// ============ Scalar parts ============

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub portion: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extent_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub physical_details: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dimensions: String,
}

impl Extent {
    /// Display label, e.g. `2 linear feet (3 boxes)`.
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if !self.number.is_empty() {
            parts.push(self.number.clone());
        }
        if !self.extent_type.is_empty() {
            parts.push(self.extent_type.replace('_', " "));
        }
        let mut label = parts.join(" ");
        if !self.container_summary.is_empty() {
            if label.is_empty() {
                label = self.container_summary.clone();
            } else {
                label = format!("{} ({})", label, self.container_summary);
            }
        }
        label
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Date {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub date_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expression: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub begin: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub end: String,
}

impl Date {
    /// The free-text expression, else `begin - end`, else whichever bound exists.
    pub fn display(&self) -> String {
        if !self.expression.is_empty() {
            return self.expression.clone();
        }
        match (self.begin.is_empty(), self.end.is_empty()) {
            (false, false) => format!("{} - {}", self.begin, self.end),
            (false, true) => self.begin.clone(),
            (true, false) => self.end.clone(),
            (true, true) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub term_type: String,
}

// ============ Entities ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub publish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<Term>,
}

impl Subject {
    /// Term type of the leading term (`topical`, `function`, ...), if any.
    pub fn term_type(&self) -> Option<&str> {
        self.terms
            .first()
            .map(|t| t.term_type.as_str())
            .filter(|t| !t.is_empty())
    }
}

impl Entity for Subject {
    const KIND: &'static str = "subject";

    fn uri(&self) -> &str {
        &self.uri
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    #[serde(default)]
    pub file_uri: String,
    #[serde(default)]
    pub publish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_statement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalObject {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_object_id: Option<String>,
    #[serde(default)]
    pub publish: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_versions: Vec<FileVersion>,
}

impl DigitalObject {
    pub fn file_uris(&self) -> impl Iterator<Item = &str> {
        self.file_versions
            .iter()
            .map(|v| v.file_uri.as_str())
            .filter(|u| !u.is_empty())
    }
}

impl Entity for DigitalObject {
    const KIND: &'static str = "digital object";

    fn uri(&self) -> &str {
        &self.uri
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentName {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sort_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub primary_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rest_of_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_type: String,
    #[serde(default)]
    pub publish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<AgentName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<AgentName>,
}

impl Agent {
    /// `title`, else the display name's sort name, else the first name's.
    pub fn display_title(&self) -> &str {
        if !self.title.is_empty() {
            return &self.title;
        }
        self.display_name
            .iter()
            .chain(self.names.iter())
            .map(|n| n.sort_name.as_str())
            .find(|n| !n.is_empty())
            .unwrap_or("")
    }
}

impl Entity for Agent {
    const KIND: &'static str = "agent";

    fn uri(&self) -> &str {
        &self.uri
    }
}

/// A raw accession record, references not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accession {
    pub uri: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_0: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_3: Option<String>,
    #[serde(default)]
    pub content_description: String,
    #[serde(default)]
    pub condition_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accession_date: Option<String>,
    #[serde(default)]
    pub publish: bool,
    #[serde(default)]
    pub suppressed: bool,
    #[serde(default)]
    pub subjects: Vec<Reference>,
    #[serde(default)]
    pub digital_objects: Vec<Reference>,
    #[serde(default)]
    pub linked_agents: Vec<AgentLink>,
    #[serde(default)]
    pub extents: Vec<Extent>,
    #[serde(default)]
    pub dates: Vec<Date>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<Instance>,
}

impl Accession {
    /// Four-part identifier joined with `-`, empty parts skipped.
    pub fn identifier(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.id_0, &self.id_1, &self.id_2, &self.id_3]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("-"))
        }
    }

    /// Digital object references: the explicit list first, then those linked
    /// through instances, in document order.
    pub fn digital_object_refs(&self) -> impl Iterator<Item = &Reference> {
        self.digital_objects
            .iter()
            .chain(self.instances.iter().filter_map(|i| i.digital_object.as_ref()))
    }
}

impl Entity for Accession {
    const KIND: &'static str = "accession";

    fn uri(&self) -> &str {
        &self.uri
    }
}

// ============ Entity maps ============

/// URI-keyed entities of one kind, built once per run.
///
/// Keys are unique: once a URI is present it cannot be replaced.
#[derive(Debug, Clone)]
pub struct EntityMap<E> {
    entries: BTreeMap<String, E>,
}

impl<E: Entity> EntityMap<E> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert an entity under its own URI.
    ///
    /// Returns the entity back if its URI is already taken.
    pub fn insert(&mut self, entity: E) -> Result<(), E> {
        match self.entries.entry(entity.uri().to_string()) {
            btree_map::Entry::Occupied(_) => Err(entity),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(entity);
                Ok(())
            }
        }
    }

    pub fn get(&self, uri: &str) -> Option<&E> {
        self.entries.get(uri)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &E)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<E: Entity> Default for EntityMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// First occurrence of a URI wins.
impl<E: Entity> FromIterator<E> for EntityMap<E> {
    fn from_iter<T: IntoIterator<Item = E>>(iter: T) -> Self {
        let mut map = Self::new();
        for entity in iter {
            let _ = map.insert(entity);
        }
        map
    }
}
