//! Ordered collection of captured sections with case-group aware deletion.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::section::{CaseGroupId, Section, SectionId, SectionKind};

/// Outcome of a removal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "ids", rename_all = "snake_case")]
pub enum RemoveOutcome {
    /// Sections removed, in collection order
    Removed(Vec<SectionId>),
    /// Case questions cannot be removed while their case paragraph exists
    Refused,
    NotFound,
}

#[derive(Debug, Default)]
pub struct SectionCollection {
    sections: Vec<Section>,
    groups: HashMap<CaseGroupId, HashSet<SectionId>>,
}

impl SectionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Sections in creation order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn get(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Members of a case group, paragraph included
    pub fn group_members(&self, group: CaseGroupId) -> Option<&HashSet<SectionId>> {
        self.groups.get(&group)
    }

    pub fn append(&mut self, section: Section) {
        if let Some(group) = section.case_group_id() {
            self.groups.entry(group).or_default().insert(section.id);
        }
        debug!(
            id = %section.id,
            kind = %section.kind(),
            page = section.page_number,
            "Appended section"
        );
        self.sections.push(section);
    }

    /// Remove a section, cascading from a case paragraph to its questions.
    pub fn remove(&mut self, id: SectionId) -> RemoveOutcome {
        let Some(target) = self.get(id) else {
            return RemoveOutcome::NotFound;
        };
        let kind = target.kind();
        let group = target.case_group_id();

        let doomed: HashSet<SectionId> = match (kind, group) {
            (SectionKind::Case, Some(group)) => self
                .groups
                .remove(&group)
                .unwrap_or_else(|| HashSet::from([id])),
            (SectionKind::CaseQuestion, Some(group)) => {
                if self.group_has_case(group) {
                    debug!(id = %id, group = %group, "Refused to remove linked case question");
                    return RemoveOutcome::Refused;
                }
                if let Some(members) = self.groups.get_mut(&group) {
                    members.remove(&id);
                    if members.is_empty() {
                        self.groups.remove(&group);
                    }
                }
                HashSet::from([id])
            }
            _ => HashSet::from([id]),
        };

        let removed: Vec<SectionId> = self
            .sections
            .iter()
            .filter(|s| doomed.contains(&s.id))
            .map(|s| s.id)
            .collect();
        self.sections.retain(|s| !doomed.contains(&s.id));

        info!(id = %id, kind = %kind, removed = removed.len(), "Removed sections");
        RemoveOutcome::Removed(removed)
    }

    pub fn clear(&mut self) {
        self.sections.clear();
        self.groups.clear();
    }

    fn group_has_case(&self, group: CaseGroupId) -> bool {
        self.groups.get(&group).is_some_and(|members| {
            members.iter().any(|member| {
                self.get(*member)
                    .is_some_and(|s| s.kind() == SectionKind::Case)
            })
        })
    }
}
