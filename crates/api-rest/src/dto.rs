//! Request and response bodies.
//!
//! Core types are carried as opaque JSON objects in the OpenAPI document; only the envelope
//! shapes are described here.

use cohort_core::model::Panel;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

/// A resolved compiler context and its state labels.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContextRes {
    #[schema(value_type = Object)]
    pub context: serde_json::Value,
    /// `["ok"]`, or any of `queryNotFound`, `datasetNotFound`, `datasetShapeMismatch`,
    /// `panelNotFound`.
    pub state: Vec<String>,
}

/// References to check, as raw strings (URN or local id).
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PreflightReq {
    pub concepts: Vec<String>,
    pub queries: Vec<String>,
    pub imports: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PreflightRes {
    pub ok: bool,
    #[schema(value_type = Object)]
    pub resources: serde_json::Value,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitReq {
    pub name: String,
    #[schema(value_type = Vec<Object>)]
    pub panels: Vec<Panel>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRes {
    pub correlation_id: i64,
}
