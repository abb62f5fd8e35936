//! Compiler context providers.
//!
//! Each provider resolves a saved query plus one secondary resource (dataset, concept, panel
//! index, or the node's demographic query) into a context ready for the external compiler:
//!
//! 1. pick the addressing mode of each reference ([`crate::resolver::resolve`]),
//! 2. pick exactly one procedure from the matching dispatch table,
//! 3. issue that call with the caller's identity,
//! 4. read the row sets in order and project them into the context,
//! 5. classify the result into a [`ContextState`].
//!
//! Backend failures are wrapped with the references being resolved and returned; nothing is
//! retried here.

mod concept;
mod dataset;
mod demographic;
mod panel;
pub mod state;

pub use concept::ConceptDatasetContext;
pub use dataset::DatasetContext;
pub use demographic::DemographicContext;
pub use panel::PanelContext;
pub use state::ContextState;

use crate::backend::rows::QueryContextRecord;
use crate::backend::{keys, Backend, RowSetReader};
use crate::model::QueryContext;
use crate::refs::{QueryRef, ResourceRef};
use crate::resolver::AddressingMode;
use crate::CoreResult;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// A context together with its classification.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resolved<C> {
    pub context: C,
    #[serde(serialize_with = "serialize_state")]
    pub state: ContextState,
}

fn serialize_state<S: serde::Serializer>(state: &ContextState, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(state.labels())
}

/// Optional early/late date bounds supplied by a caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateBounds {
    pub early: Option<NaiveDate>,
    pub late: Option<NaiveDate>,
}

/// Resolves compiler contexts against a backend.
#[derive(Clone)]
pub struct CompilerContextProvider {
    backend: Arc<dyn Backend>,
}

impl CompilerContextProvider {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }
}

/// The parameter value for a reference under its addressing mode.
pub(crate) fn key_value(reference: &ResourceRef) -> Value {
    match reference.mode() {
        AddressingMode::ById => reference
            .id
            .map(|id| Value::String(id.to_string()))
            .unwrap_or(Value::Null),
        AddressingMode::ByUniversalId => reference
            .universal_id
            .as_ref()
            .map(|urn| Value::String(urn.to_string()))
            .unwrap_or(Value::Null),
    }
}

/// Parameter name for the query key under its addressing mode.
pub(crate) fn query_key(query: &QueryRef) -> &'static str {
    match query.mode() {
        AddressingMode::ById => keys::QUERY_ID,
        AddressingMode::ByUniversalId => keys::QUERY_UID,
    }
}

/// Reads the query-context row set, falling back to a not-found context.
pub(crate) fn read_query_context(
    reader: &mut RowSetReader,
    requested: &QueryRef,
) -> CoreResult<QueryContext> {
    Ok(reader
        .read_first::<QueryContextRecord>()?
        .map(QueryContext::from)
        .unwrap_or_else(|| QueryContext::not_found(requested)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::backend::rows::QueryContextRecord;
    use crate::user::UserContext;
    use uuid::Uuid;

    pub(crate) fn user() -> UserContext {
        UserContext::new("jdoe", "idp").unwrap()
    }

    pub(crate) fn query_row() -> QueryContextRecord {
        QueryContextRecord {
            query_id: Uuid::new_v4(),
            universal_id: None,
            owner: Some("jdoe@idp".into()),
            ver: Some(3),
            pepper: Some(Uuid::new_v4()),
        }
    }
}
