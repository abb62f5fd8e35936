//! Concepts and their specializations.
//!
//! Concepts form a tree via `parent_id`; `root_id` names the top of the tree. The SQL fragment
//! fields are opaque here and consumed only by the external compiler.

use cohort_urn::Urn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptFlags {
    #[serde(default)]
    pub is_numeric: bool,
    #[serde(default)]
    pub is_event_based: bool,
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default)]
    pub is_encounter_based: bool,
    #[serde(default)]
    pub is_specializable: bool,
    #[serde(default)]
    pub is_patient_count_autocalculated: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSql {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_where: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_numeric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_event: Option<String>,
}

/// A single mutually exclusive sub-choice of a concept, e.g. "within 30 days".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialization {
    pub id: Uuid,
    pub specialization_group_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<Urn>,
    pub ui_display_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_set_where: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

/// A group of specializations belonging to one concept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecializationGroup {
    pub id: i32,
    pub concept_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_set_from: Option<String>,
    pub ui_default_text: String,
    /// Backend order is kept; the first entry is the UI default.
    pub specializations: Vec<Specialization>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub root_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<Urn>,
    pub flags: ConceptFlags,
    pub sql: ConceptSql,
    pub ui_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_display_text: Option<String>,
    /// Never absent: a concept without groups has an empty list.
    pub specialization_groups: Vec<SpecializationGroup>,
}
