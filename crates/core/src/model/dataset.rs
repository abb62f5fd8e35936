use cohort_types::Shape;
use cohort_urn::Urn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dataset definition: a shaped, compiler-owned SQL statement returning patient rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetQuery {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<Urn>,
    pub shape: Shape,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub sql_statement: String,
    #[serde(default)]
    pub is_encounter_based: bool,
}

/// The node-wide demographic query used to build the basic patient list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicQuery {
    pub sql_statement: String,
    #[serde(default)]
    pub columns: Vec<String>,
}
