//! Concept hydration.
//!
//! Joins the three flat row sets a concept lookup returns (concepts, specialization groups,
//! specializations) into nested [`Concept`]s in one pass.

use crate::backend::rows::{ConceptRecord, SpecializationGroupRecord};
use crate::model::{Concept, Specialization, SpecializationGroup};
use std::collections::HashMap;
use uuid::Uuid;

/// Builds nested concepts from flat rows.
///
/// Both joins are left outer joins: a group with no specializations and a concept with no
/// groups still appear, with empty lists. Group and specialization order follows row order.
/// Rows referencing an unknown group or concept are dropped.
pub fn hydrate_concepts(
    concepts: Vec<ConceptRecord>,
    groups: Vec<SpecializationGroupRecord>,
    specializations: Vec<Specialization>,
) -> Vec<Concept> {
    let mut specs_by_group: HashMap<i32, Vec<Specialization>> = HashMap::new();
    for spec in specializations {
        specs_by_group
            .entry(spec.specialization_group_id)
            .or_default()
            .push(spec);
    }

    let mut groups_by_concept: HashMap<Uuid, Vec<SpecializationGroup>> = HashMap::new();
    for group in groups {
        let specializations = specs_by_group.remove(&group.id).unwrap_or_default();
        groups_by_concept
            .entry(group.concept_id)
            .or_default()
            .push(SpecializationGroup {
                id: group.id,
                concept_id: group.concept_id,
                sql_set_from: group.sql_set_from,
                ui_default_text: group.ui_default_text,
                specializations,
            });
    }

    concepts
        .into_iter()
        .map(|record| {
            let groups = groups_by_concept.remove(&record.id).unwrap_or_default();
            let mut concept = record.into_concept();
            concept.specialization_groups = groups;
            concept
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: Uuid) -> ConceptRecord {
        ConceptRecord {
            id,
            parent_id: None,
            root_id: id,
            universal_id: None,
            is_numeric: false,
            is_event_based: false,
            is_parent: false,
            is_encounter_based: false,
            is_specializable: true,
            is_patient_count_autocalculated: false,
            sql_set_from: None,
            sql_set_where: None,
            sql_field_date: None,
            sql_field_numeric: None,
            sql_field_event: None,
            ui_display_name: "c".into(),
            ui_display_text: None,
        }
    }

    fn group(id: i32, concept_id: Uuid) -> SpecializationGroupRecord {
        SpecializationGroupRecord {
            id,
            concept_id,
            sql_set_from: None,
            ui_default_text: format!("group {id}"),
        }
    }

    fn spec(group_id: i32, text: &str) -> Specialization {
        Specialization {
            id: Uuid::new_v4(),
            specialization_group_id: group_id,
            universal_id: None,
            ui_display_text: text.into(),
            sql_set_where: None,
            order: None,
        }
    }

    #[test]
    fn test_concept_without_groups_has_empty_list() {
        let id = Uuid::new_v4();

        let hydrated = hydrate_concepts(vec![concept(id)], vec![], vec![]);

        assert_eq!(hydrated.len(), 1);
        assert!(hydrated[0].specialization_groups.is_empty());
    }

    #[test]
    fn test_group_without_specializations_still_appears() {
        let id = Uuid::new_v4();

        let hydrated = hydrate_concepts(vec![concept(id)], vec![group(1, id)], vec![]);

        assert_eq!(hydrated[0].specialization_groups.len(), 1);
        assert!(hydrated[0].specialization_groups[0]
            .specializations
            .is_empty());
    }

    #[test]
    fn test_order_is_preserved_within_concept() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let hydrated = hydrate_concepts(
            vec![concept(a), concept(b)],
            vec![group(2, a), group(1, a), group(3, b)],
            vec![
                spec(1, "7 days"),
                spec(2, "inpatient"),
                spec(1, "30 days"),
                spec(3, "any"),
            ],
        );

        let groups = &hydrated[0].specialization_groups;
        assert_eq!(groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![2, 1]);
        let texts: Vec<_> = groups[1]
            .specializations
            .iter()
            .map(|s| s.ui_display_text.as_str())
            .collect();
        assert_eq!(texts, vec!["7 days", "30 days"]);
        assert_eq!(hydrated[1].specialization_groups[0].id, 3);
    }

    #[test]
    fn test_orphan_rows_are_dropped() {
        let a = Uuid::new_v4();

        let hydrated = hydrate_concepts(
            vec![concept(a)],
            vec![group(1, Uuid::new_v4())],
            vec![spec(9, "orphan")],
        );

        assert!(hydrated[0].specialization_groups.is_empty());
    }
}
