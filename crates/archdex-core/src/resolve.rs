//! Reference resolution: raw accession + entity maps → normalized view.
//!
//! Resolution is total. Every reference on the accession produces exactly one
//! entry in the corresponding list of the view, in the original order: either
//! the inlined entity or an [`Resolved::Unresolved`] marker carrying the URI
//! that could not be found. A missing reference never aborts resolution.
//!
//! Publication policy (unpublished or suppressed accessions) belongs to the
//! caller; [`normalize_view`] always resolves.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{
    Accession, Agent, AgentRole, Date, DigitalObject, Entity, EntityMap, Extent, Subject,
};

/// One resolved reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolved<T> {
    Inlined(T),
    Unresolved { uri: String },
}

impl<T> Resolved<T> {
    pub fn inlined(&self) -> Option<&T> {
        match self {
            Resolved::Inlined(t) => Some(t),
            Resolved::Unresolved { .. } => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolved::Unresolved { .. })
    }
}

/// An agent inlined together with the role tag it carries on the accession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedAgent {
    pub role: AgentRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relator: Option<String>,
    pub agent: Agent,
}

/// A reference that did not resolve, as reported by [`NormalizedView::unresolved`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRef<'a> {
    pub kind: &'static str,
    pub uri: &'a str,
}

/// An accession with every reference inlined.
///
/// A pure function of the accession and the entity maps: recomputing it from
/// the same inputs serializes to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedView {
    pub uri: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub content_description: String,
    pub condition_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession_date: Option<String>,
    pub publish: bool,
    pub suppressed: bool,
    pub extents: Vec<Extent>,
    pub dates: Vec<Date>,
    pub subjects: Vec<Resolved<Subject>>,
    pub digital_objects: Vec<Resolved<DigitalObject>>,
    pub linked_agents: Vec<Resolved<LinkedAgent>>,
}

impl NormalizedView {
    /// Titles of the resolved subjects, in reference order.
    pub fn subject_titles(&self) -> Vec<&str> {
        self.subjects
            .iter()
            .filter_map(Resolved::inlined)
            .map(|s| s.title.as_str())
            .collect()
    }

    /// Every reference that did not resolve, grouped by list in view order.
    pub fn unresolved(&self) -> impl Iterator<Item = UnresolvedRef<'_>> {
        fn markers<'a, T>(
            kind: &'static str,
            list: &'a [Resolved<T>],
        ) -> impl Iterator<Item = UnresolvedRef<'a>> {
            list.iter().filter_map(move |r| match r {
                Resolved::Unresolved { uri } => Some(UnresolvedRef { kind, uri }),
                Resolved::Inlined(_) => None,
            })
        }

        markers(Subject::KIND, &self.subjects)
            .chain(markers(DigitalObject::KIND, &self.digital_objects))
            .chain(markers(Agent::KIND, &self.linked_agents))
    }

    /// Hex SHA-256 of the view's JSON serialization.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

fn resolve<E: Entity + Clone>(map: &EntityMap<E>, uri: &str) -> Resolved<E> {
    match map.get(uri) {
        Some(entity) => Resolved::Inlined(entity.clone()),
        None => Resolved::Unresolved {
            uri: uri.to_string(),
        },
    }
}

/// Build the normalized view of `accession` against the three entity maps.
pub fn normalize_view(
    accession: &Accession,
    subjects: &EntityMap<Subject>,
    digital_objects: &EntityMap<DigitalObject>,
    agents: &EntityMap<Agent>,
) -> NormalizedView {
    let subjects = accession
        .subjects
        .iter()
        .map(|r| resolve(subjects, &r.uri))
        .collect();

    let digital_objects = accession
        .digital_object_refs()
        .map(|r| resolve(digital_objects, &r.uri))
        .collect();

    let linked_agents = accession
        .linked_agents
        .iter()
        .map(|link| match agents.get(&link.uri) {
            Some(agent) => Resolved::Inlined(LinkedAgent {
                role: link.role.clone(),
                relator: link.relator.clone(),
                agent: agent.clone(),
            }),
            None => Resolved::Unresolved {
                uri: link.uri.clone(),
            },
        })
        .collect();

    let view = NormalizedView {
        uri: accession.uri.clone(),
        title: accession.title.clone(),
        identifier: accession.identifier(),
        content_description: accession.content_description.clone(),
        condition_description: accession.condition_description.clone(),
        accession_date: accession.accession_date.clone(),
        publish: accession.publish,
        suppressed: accession.suppressed,
        extents: accession.extents.clone(),
        dates: accession.dates.clone(),
        subjects,
        digital_objects,
        linked_agents,
    };

    for missing in view.unresolved() {
        tracing::debug!(
            accession = %view.uri,
            kind = missing.kind,
            uri = missing.uri,
            "unresolved reference"
        );
    }

    view
}

/// The three lookup maps a run resolves against, passed explicitly rather
/// than held in process-wide state.
#[derive(Debug, Clone, Default)]
pub struct EntityMaps {
    pub subjects: EntityMap<Subject>,
    pub digital_objects: EntityMap<DigitalObject>,
    pub agents: EntityMap<Agent>,
}

impl EntityMaps {
    pub fn normalize(&self, accession: &Accession) -> NormalizedView {
        normalize_view(
            accession,
            &self.subjects,
            &self.digital_objects,
            &self.agents,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentLink, Reference};

    fn subject(uri: &str, title: &str) -> Subject {
        Subject {
            uri: uri.to_string(),
            title: title.to_string(),
            publish: true,
            source: None,
            scope_note: None,
            terms: Vec::new(),
        }
    }

    fn accession(subjects: &[&str]) -> Accession {
        Accession {
            uri: "/repositories/2/accessions/1".into(),
            title: "Hale papers".into(),
            id_0: Some("1986".into()),
            id_1: Some("004".into()),
            id_2: None,
            id_3: None,
            content_description: "Correspondence and notebooks".into(),
            condition_description: String::new(),
            accession_date: Some("1986-03-01".into()),
            publish: true,
            suppressed: false,
            subjects: subjects.iter().map(|s| Reference::new(*s)).collect(),
            digital_objects: Vec::new(),
            linked_agents: Vec::new(),
            extents: vec![Extent {
                number: "4".into(),
                extent_type: "linear_feet".into(),
                ..Default::default()
            }],
            dates: Vec::new(),
            instances: Vec::new(),
        }
    }

    fn maps() -> EntityMaps {
        EntityMaps {
            subjects: [subject("S1", "Art"), subject("S2", "History")]
                .into_iter()
                .collect(),
            digital_objects: EntityMap::new(),
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
        }
    }

    #[test]
    fn subjects_inline_in_reference_order() {
        let view = maps().normalize(&accession(&["S1", "S2"]));
        assert_eq!(view.subject_titles(), vec!["Art", "History"]);

        let reversed = maps().normalize(&accession(&["S2", "S1"]));
        assert_eq!(reversed.subject_titles(), vec!["History", "Art"]);
    }

    #[test]
    fn missing_subject_becomes_marker() {
        let view = maps().normalize(&accession(&["S1", "S9", "S2"]));
        assert_eq!(view.subjects.len(), 3);
        assert_eq!(
            view.subjects[1],
            Resolved::Unresolved {
                uri: "S9".to_string()
            }
        );
        assert_eq!(view.subject_titles(), vec!["Art", "History"]);

        let missing: Vec<UnresolvedRef<'_>> = view.unresolved().collect();
        assert_eq!(
            missing,
            vec![UnresolvedRef {
                kind: "subject",
                uri: "S9"
            }]
        );
    }

    #[test]
    fn every_reference_is_represented() {
        let mut acc = accession(&["S1", "S404"]);
        acc.digital_objects = vec![Reference::new("/repositories/2/digital_objects/9")];
        acc.linked_agents = vec![
            AgentLink {
                uri: "/agents/people/1".into(),
                role: AgentRole::Creator,
                relator: None,
            },
            AgentLink {
                uri: "/agents/people/77".into(),
                role: AgentRole::Subject,
                relator: Some("ctb".into()),
            },
        ];

        let view = normalize_view(
            &acc,
            &maps().subjects,
            &EntityMap::new(),
            &maps().agents,
        );

        assert_eq!(view.subjects.len(), acc.subjects.len());
        assert_eq!(view.digital_objects.len(), 1);
        assert!(view.digital_objects[0].is_unresolved());
        assert_eq!(view.linked_agents.len(), 2);

        let creator = view.linked_agents[0].inlined().unwrap();
        assert_eq!(creator.role, AgentRole::Creator);
        assert_eq!(creator.agent.display_title(), "Hale, George Ellery");
        assert!(view.linked_agents[1].is_unresolved());
        assert_eq!(view.unresolved().count(), 3);
    }

    #[test]
    fn scalars_copy_through() {
        let acc = accession(&[]);
        let view = maps().normalize(&acc);
        assert_eq!(view.title, acc.title);
        assert_eq!(view.content_description, acc.content_description);
        assert_eq!(view.identifier.as_deref(), Some("1986-004"));
        assert_eq!(view.extents, acc.extents);
        assert!(view.publish);
        assert!(!view.suppressed);
    }

    #[test]
    fn suppressed_accessions_still_resolve() {
        let mut acc = accession(&["S1"]);
        acc.publish = false;
        acc.suppressed = true;
        let view = maps().normalize(&acc);
        assert_eq!(view.subject_titles(), vec!["Art"]);
        assert!(view.suppressed);
    }

    #[test]
    fn recomputing_is_byte_identical() {
        let acc = accession(&["S2", "S9", "S1"]);
        let first = serde_json::to_vec(&maps().normalize(&acc)).unwrap();
        let second = serde_json::to_vec(&maps().normalize(&acc)).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            maps().normalize(&acc).digest(),
            maps().normalize(&acc).digest()
        );
    }

    #[test]
    fn unresolved_marker_serializes_with_status() {
        let view = maps().normalize(&accession(&["S9"]));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json["subjects"][0],
            serde_json::json!({"status": "unresolved", "uri": "S9"})
        );
    }
}
