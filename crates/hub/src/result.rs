//! Query results returned by adapter nodes.

use crate::{parse_strict, Hub, HubResult};
use serde::{Deserialize, Serialize};

/// Outcome reported by an adapter node for one run-query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Completed,
    Error,
    Unavailable,
}

/// Parameters of the count obfuscation applied by the adapter node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObfuscatingParameters {
    pub binning_enabled: bool,
    pub bin_size: u32,
    pub std_dev: u32,
    pub noise_clamp: u32,
    pub low_limit: u32,
}

/// A single node's answer to a run-query.
///
/// `query_id` is the correlation id of the originating submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryResult {
    pub query_id: i64,
    pub adapter_node_id: i64,
    pub adapter_node_name: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscating_parameters: Option<ObfuscatingParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Hub {
    /// Parse a query result from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HubError::Translation`] naming the failing field path if the JSON does
    /// not match the result schema.
    pub fn query_result_parse(json_text: &str) -> HubResult<QueryResult> {
        parse_strict(json_text, "Query result")
    }

    /// Render a query result as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HubError::InvalidJson`] if serialisation fails.
    pub fn query_result_render(result: &QueryResult) -> HubResult<String> {
        Ok(serde_json::to_string(result)?)
    }
}
