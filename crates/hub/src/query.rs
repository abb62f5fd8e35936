//! Run-query wire models.
//!
//! A run-query is the unit of work the hub fans out to every adapter node. Its `id` doubles
//! as the correlation id: results come back tagged with the same value.
//!
//! Notes:
//! - Researcher and topic are versioned sub-objects; their `versionInfo` carries the protocol
//!   version so the hub can reject nodes speaking an older dialect.
//! - Expressions are tagged with `encodedClass`, matching the hub's polymorphic encoding.

use crate::{parse_strict, Hub, HubError, HubResult, PROTOCOL_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version stamp carried by every versioned hub item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VersionInfo {
    pub protocol_version: u32,
    pub item_version: u32,
    pub create_date: DateTime<Utc>,
    pub change_date: DateTime<Utc>,
}

impl VersionInfo {
    /// Stamps a freshly created item at `now` with this node's protocol version.
    pub fn created_at(now: DateTime<Utc>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            item_version: 1,
            create_date: now,
            change_date: now,
        }
    }
}

/// The researcher on whose behalf a query runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Researcher {
    pub id: i64,
    pub version_info: VersionInfo,
    pub user_name: String,
    pub user_domain_name: String,
    pub node_id: i64,
}

/// The approved research topic a query is filed under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Topic {
    pub id: i64,
    pub version_info: VersionInfo,
    pub researcher_id: i64,
    pub name: String,
    pub description: String,
}

/// Lifecycle status of a run-query as seen by the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    ReadyForTransfer,
    SentToHub,
    ReceivedByHub,
}

/// What each adapter node should return.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultOutputType {
    Count,
}

/// A node of the boolean expression tree describing the cohort.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encodedClass", rename_all_fields = "camelCase")]
pub enum Expression {
    /// At least `n_must_be_true` of the terms must hold. An AND has `n` equal to the number
    /// of terms; an OR has `n` equal to one.
    Conjunction {
        n_must_be_true: u32,
        possibly_terms: Vec<Expression>,
    },
    /// Negation of the inner expression.
    Not { expression: Box<Expression> },
    /// A single network concept, addressed by its universal identifier.
    Concept {
        display_name: String,
        term_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        constraint: Option<String>,
    },
}

impl Expression {
    /// Every term must hold.
    pub fn all(terms: Vec<Expression>) -> Self {
        let n = u32::try_from(terms.len()).unwrap_or(u32::MAX);
        Expression::Conjunction {
            n_must_be_true: n,
            possibly_terms: terms,
        }
    }

    /// At least one term must hold.
    pub fn any(terms: Vec<Expression>) -> Self {
        Expression::Conjunction {
            n_must_be_true: 1,
            possibly_terms: terms,
        }
    }

    pub fn not(inner: Expression) -> Self {
        Expression::Not {
            expression: Box::new(inner),
        }
    }
}

/// The query body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryDefinition {
    pub expression: Expression,
}

/// A run-query request, as submitted to the hub.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunQuery {
    pub id: i64,
    pub version_info: VersionInfo,
    pub status: QueryStatus,
    pub query_definition: QueryDefinition,
    pub researcher: Researcher,
    pub topic: Topic,
    pub node_of_origin_id: i64,
    pub query_name: String,
    pub output: ResultOutputType,
}

impl Hub {
    /// Parse a run-query from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Translation`] naming the failing field path if the JSON does not
    /// match the run-query schema (unknown keys included), or [`HubError::InvalidInput`] if
    /// the embedded protocol version is newer than this node understands.
    pub fn run_query_parse(json_text: &str) -> HubResult<RunQuery> {
        let query: RunQuery = parse_strict(json_text, "Run-query")?;

        for (what, version) in [
            ("query", &query.version_info),
            ("researcher", &query.researcher.version_info),
            ("topic", &query.topic.version_info),
        ] {
            if version.protocol_version > PROTOCOL_VERSION {
                return Err(HubError::InvalidInput(format!(
                    "{what} uses protocol version {}, newest supported is {}",
                    version.protocol_version, PROTOCOL_VERSION
                )));
            }
        }

        Ok(query)
    }

    /// Render a run-query as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidJson`] if serialisation fails.
    pub fn run_query_render(query: &RunQuery) -> HubResult<String> {
        Ok(serde_json::to_string(query)?)
    }
}
