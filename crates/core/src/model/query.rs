use crate::model::panel::Panel;
use crate::refs::QueryRef;
use cohort_urn::Urn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Existence, ownership and version metadata of a referenced saved query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<Urn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    /// Per-query salt used when pseudonymising patient ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pepper: Option<Uuid>,
}

impl QueryContext {
    /// A context echoing the requested reference, for a query the backend did not return.
    pub fn not_found(requested: &QueryRef) -> Self {
        let reference = requested.reference();
        Self {
            found: false,
            query_id: reference.id,
            universal_id: reference.universal_id.clone(),
            owner: None,
            version: None,
            pepper: None,
        }
    }
}

/// A locally built query submitted for federated execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedQuery {
    pub name: String,
    pub panels: Vec<Panel>,
}
