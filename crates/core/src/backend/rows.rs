//! Row records returned by the procedures, in camelCase column naming.
//!
//! Where a domain type already matches a row one-to-one (`DatasetQuery`, `DemographicQuery`,
//! `Specialization`, `GlobalPanelFilter`) it is decoded directly and has no record here.

use crate::model::{Concept, ConceptFlags, ConceptSql, QueryContext};
use cohort_urn::Urn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A saved query's context row. Absence of the row means not found or not authorized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContextRecord {
    pub query_id: Uuid,
    #[serde(default)]
    pub universal_id: Option<Urn>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub ver: Option<i32>,
    #[serde(default)]
    pub pepper: Option<Uuid>,
}

impl From<QueryContextRecord> for QueryContext {
    fn from(r: QueryContextRecord) -> Self {
        QueryContext {
            found: true,
            query_id: Some(r.query_id),
            universal_id: r.universal_id,
            owner: r.owner,
            version: r.ver,
            pepper: r.pepper,
        }
    }
}

/// The stored JSON definition (array of panels) of a saved query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRecord {
    pub definition: String,
}

/// A flat concept row, before specialization groups are joined on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRecord {
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub root_id: Uuid,
    #[serde(default)]
    pub universal_id: Option<Urn>,
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
    #[serde(default)]
    pub sql_set_from: Option<String>,
    #[serde(default)]
    pub sql_set_where: Option<String>,
    #[serde(default)]
    pub sql_field_date: Option<String>,
    #[serde(default)]
    pub sql_field_numeric: Option<String>,
    #[serde(default)]
    pub sql_field_event: Option<String>,
    pub ui_display_name: String,
    #[serde(default)]
    pub ui_display_text: Option<String>,
}

impl ConceptRecord {
    /// Projects the row into a concept with no specialization groups yet.
    pub fn into_concept(self) -> Concept {
        Concept {
            id: self.id,
            parent_id: self.parent_id,
            root_id: self.root_id,
            universal_id: self.universal_id,
            flags: ConceptFlags {
                is_numeric: self.is_numeric,
                is_event_based: self.is_event_based,
                is_parent: self.is_parent,
                is_encounter_based: self.is_encounter_based,
                is_specializable: self.is_specializable,
                is_patient_count_autocalculated: self.is_patient_count_autocalculated,
            },
            sql: ConceptSql {
                set_from: self.sql_set_from,
                set_where: self.sql_set_where,
                field_date: self.sql_field_date,
                field_numeric: self.sql_field_numeric,
                field_event: self.sql_field_event,
            },
            ui_display_name: self.ui_display_name,
            ui_display_text: self.ui_display_text,
            specialization_groups: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecializationGroupRecord {
    pub id: i32,
    pub concept_id: Uuid,
    #[serde(default)]
    pub sql_set_from: Option<String>,
    pub ui_default_text: String,
}

// ============================================================================
// Preflight rows
// ============================================================================

/// Presence/authorization of one directly requested concept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptPreflightRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub universal_id: Option<Urn>,
    pub is_present: bool,
    pub is_authorized: bool,
}

/// One (query, nested concept) pair. Concept columns are null for a query without concepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConceptPreflightRecord {
    #[serde(default)]
    pub query_id: Option<Uuid>,
    #[serde(default)]
    pub query_universal_id: Option<Urn>,
    #[serde(default)]
    pub query_ver: Option<i32>,
    pub query_is_present: bool,
    pub query_is_authorized: bool,
    #[serde(default)]
    pub concept_id: Option<Uuid>,
    #[serde(default)]
    pub concept_universal_id: Option<Urn>,
    #[serde(default)]
    pub concept_is_present: Option<bool>,
    #[serde(default)]
    pub concept_is_authorized: Option<bool>,
}

impl QueryConceptPreflightRecord {
    pub fn has_concept(&self) -> bool {
        self.concept_id.is_some() || self.concept_universal_id.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreflightRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub universal_id: Option<Urn>,
    pub is_present: bool,
    pub is_authorized: bool,
}
