//! The named-remote-call data access contract.
//!
//! Every lookup in this crate is a single call to a named [`Procedure`] that returns an ordered
//! list of row sets. Rows are JSON objects decoded into typed records (see [`rows`]) with
//! serde; [`RowSetReader`] enforces the fixed read order.
//!
//! Implementations:
//! - [`MemoryBackend`]: every procedure over an in-memory [`Catalog`] loaded from YAML.
//! - anything else implementing [`Backend`] (a relational warehouse adapter lives outside this
//!   crate).

pub mod catalog;
pub mod memory;
pub mod rows;

#[cfg(test)]
pub(crate) mod scripted;

pub use catalog::Catalog;
pub use memory::MemoryBackend;

use crate::user::{SessionType, UserContext};
use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Every named call the core issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Procedure {
    DatasetContextById,
    DatasetContextByQueryIdDatasetUid,
    DatasetContextByQueryUidDatasetId,
    DatasetContextByUid,
    ConceptDatasetContextById,
    ConceptDatasetContextByQueryIdConceptUid,
    ConceptDatasetContextByQueryUidConceptId,
    ConceptDatasetContextByUid,
    PanelContextById,
    PanelContextByUid,
    DemographicContextById,
    DemographicContextByUid,
    PreflightByIds,
    PreflightByUids,
}

impl Procedure {
    pub const ALL: [Procedure; 14] = [
        Procedure::DatasetContextById,
        Procedure::DatasetContextByQueryIdDatasetUid,
        Procedure::DatasetContextByQueryUidDatasetId,
        Procedure::DatasetContextByUid,
        Procedure::ConceptDatasetContextById,
        Procedure::ConceptDatasetContextByQueryIdConceptUid,
        Procedure::ConceptDatasetContextByQueryUidConceptId,
        Procedure::ConceptDatasetContextByUid,
        Procedure::PanelContextById,
        Procedure::PanelContextByUid,
        Procedure::DemographicContextById,
        Procedure::DemographicContextByUid,
        Procedure::PreflightByIds,
        Procedure::PreflightByUids,
    ];

    /// Symbolic name of the remote call.
    pub fn name(&self) -> &'static str {
        match self {
            Procedure::DatasetContextById => "app.sp_GetDatasetContextById",
            Procedure::DatasetContextByQueryIdDatasetUid => {
                "app.sp_GetDatasetContextByQueryIdDatasetUId"
            }
            Procedure::DatasetContextByQueryUidDatasetId => {
                "app.sp_GetDatasetContextByQueryUIdDatasetId"
            }
            Procedure::DatasetContextByUid => "app.sp_GetDatasetContextByUId",
            Procedure::ConceptDatasetContextById => "app.sp_GetConceptDatasetContextById",
            Procedure::ConceptDatasetContextByQueryIdConceptUid => {
                "app.sp_GetConceptDatasetContextByQueryIdConceptUId"
            }
            Procedure::ConceptDatasetContextByQueryUidConceptId => {
                "app.sp_GetConceptDatasetContextByQueryUIdConceptId"
            }
            Procedure::ConceptDatasetContextByUid => "app.sp_GetConceptDatasetContextByUId",
            Procedure::PanelContextById => "app.sp_GetPanelContextById",
            Procedure::PanelContextByUid => "app.sp_GetPanelContextByUId",
            Procedure::DemographicContextById => "app.sp_GetDemographicContextById",
            Procedure::DemographicContextByUid => "app.sp_GetDemographicContextByUId",
            Procedure::PreflightByIds => "app.sp_GetPreflightResourcesByIds",
            Procedure::PreflightByUids => "app.sp_GetPreflightResourcesByUIds",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Parameter names used by the procedures.
pub mod keys {
    pub const QUERY_ID: &str = "queryid";
    pub const QUERY_UID: &str = "queryuid";
    pub const DATASET_ID: &str = "datasetid";
    pub const DATASET_UID: &str = "datasetuid";
    pub const CONCEPT_ID: &str = "conceptid";
    pub const CONCEPT_UID: &str = "conceptuid";
    pub const CONCEPT_IDS: &str = "conceptids";
    pub const CONCEPT_UIDS: &str = "conceptuids";
    pub const QUERY_IDS: &str = "queryids";
    pub const QUERY_UIDS: &str = "queryuids";
    pub const IMPORT_IDS: &str = "importids";
    pub const IMPORT_UIDS: &str = "importuids";
}

/// Parameters of a single call: the caller's authorization context plus named keys.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParams {
    pub user: String,
    pub groups: Vec<String>,
    pub admin: bool,
    pub session_type: SessionType,
    pub identified: bool,
    pub keys: BTreeMap<&'static str, Value>,
}

impl CallParams {
    pub fn for_user(user: &UserContext) -> Self {
        Self {
            user: user.qualified_name(),
            groups: user.groups.clone(),
            admin: user.is_admin,
            session_type: user.session_type,
            identified: user.identified,
            keys: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.keys.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys.get(key)
    }

    /// Reads a key as a string, if present.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Reads a key as a list of strings. Absent keys read as empty.
    pub fn get_str_list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Row sets
// ============================================================================

pub type Row = Map<String, Value>;

/// One result set of a call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowSet(pub Vec<Row>);

impl RowSet {
    /// Serialises records into rows.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Encode` if a record does not serialise to a JSON object.
    pub fn from_records<T: Serialize>(records: &[T]) -> Result<Self, BackendError> {
        records
            .iter()
            .map(|record| match serde_json::to_value(record)? {
                Value::Object(row) => Ok(row),
                other => Err(BackendError::Encode(format!(
                    "row must be a JSON object, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The ordered row sets returned by a call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowSets(pub Vec<RowSet>);

/// Reads row sets strictly in order, decoding each into typed records.
pub struct RowSetReader {
    procedure: Procedure,
    sets: std::vec::IntoIter<RowSet>,
    position: usize,
    total: usize,
}

impl RowSetReader {
    pub fn new(procedure: Procedure, sets: RowSets) -> Self {
        let total = sets.0.len();
        Self {
            procedure,
            sets: sets.0.into_iter(),
            position: 0,
            total,
        }
    }

    /// Decodes the next row set.
    ///
    /// # Errors
    ///
    /// - `CoreError::MissingRowSet` if the call returned fewer row sets than read.
    /// - `CoreError::RowDecode` if a row does not match `T`.
    pub fn read<T: DeserializeOwned>(&mut self) -> CoreResult<Vec<T>> {
        let index = self.position;
        self.position += 1;

        let set = self.sets.next().ok_or(CoreError::MissingRowSet {
            procedure: self.procedure.name(),
            expected: index + 1,
            found: self.total,
        })?;

        set.0
            .into_iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row)).map_err(|source| {
                    CoreError::RowDecode {
                        procedure: self.procedure.name(),
                        row_set: index,
                        source,
                    }
                })
            })
            .collect()
    }

    /// Decodes the next row set and keeps its first row, if any.
    pub fn read_first<T: DeserializeOwned>(&mut self) -> CoreResult<Option<T>> {
        Ok(self.read::<T>()?.into_iter().next())
    }
}

// ============================================================================
// Backend trait
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected call: {0}")]
    Rejected(String),
    #[error("failed to encode rows: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Encode(e.to_string())
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn call(&self, procedure: Procedure, params: CallParams)
        -> Result<RowSets, BackendError>;
}

/// Issues one call, racing the caller's cancellation token.
///
/// `subject` identifies what was being resolved and is attached to any backend failure.
pub(crate) async fn invoke(
    backend: &dyn Backend,
    procedure: Procedure,
    params: CallParams,
    subject: String,
    cancel: &CancellationToken,
) -> CoreResult<RowSetReader> {
    tracing::debug!(procedure = procedure.name(), %subject, user = %params.user, "backend call");

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(procedure = procedure.name(), "backend call cancelled");
            return Err(CoreError::Cancelled(procedure.name()));
        }
        result = backend.call(procedure, params) => result,
    };

    match result {
        Ok(sets) => {
            tracing::debug!(
                procedure = procedure.name(),
                row_sets = sets.0.len(),
                "backend call returned"
            );
            Ok(RowSetReader::new(procedure, sets))
        }
        Err(source) => Err(CoreError::Backend {
            procedure: procedure.name(),
            subject,
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        name: String,
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_reader_reads_in_order() {
        let sets = RowSets(vec![
            RowSet(vec![row(json!({"name": "first"}))]),
            RowSet(vec![]),
        ]);
        let mut reader = RowSetReader::new(Procedure::PanelContextById, sets);

        assert_eq!(
            reader.read_first::<Named>().unwrap(),
            Some(Named {
                name: "first".into()
            })
        );
        assert!(reader.read_first::<Named>().unwrap().is_none());
    }

    #[test]
    fn test_reader_reports_missing_set() {
        let mut reader = RowSetReader::new(Procedure::PanelContextById, RowSets::default());

        match reader.read::<Named>() {
            Err(CoreError::MissingRowSet {
                procedure,
                expected,
                found,
            }) => {
                assert_eq!(procedure, "app.sp_GetPanelContextById");
                assert_eq!(expected, 1);
                assert_eq!(found, 0);
            }
            _ => panic!("Expected MissingRowSet error"),
        }
    }

    #[test]
    fn test_reader_reports_decode_failure() {
        let sets = RowSets(vec![RowSet(vec![row(json!({"name": 5}))])]);
        let mut reader = RowSetReader::new(Procedure::PreflightByIds, sets);

        assert!(matches!(
            reader.read::<Named>(),
            Err(CoreError::RowDecode { row_set: 0, .. })
        ));
    }

    #[test]
    fn test_call_params_carry_identity() {
        let user = UserContext::new("jdoe", "idp")
            .unwrap()
            .with_groups(["g1"])
            .with_admin(true);

        let params = CallParams::for_user(&user)
            .with(keys::QUERY_IDS, json!(["a", "b"]))
            .with(keys::QUERY_UID, "urn:cohort:query:q");

        assert_eq!(params.user, "jdoe@idp");
        assert!(params.admin);
        assert_eq!(params.get_str_list(keys::QUERY_IDS), vec!["a", "b"]);
        assert_eq!(params.get_str(keys::QUERY_UID), Some("urn:cohort:query:q"));
        assert!(params.get_str_list(keys::IMPORT_IDS).is_empty());
    }

    #[test]
    fn test_procedure_names_are_unique() {
        let names: std::collections::HashSet<_> =
            Procedure::ALL.iter().map(Procedure::name).collect();

        assert_eq!(names.len(), Procedure::ALL.len());
    }

    #[test]
    fn test_row_set_from_records_rejects_non_objects() {
        assert!(RowSet::from_records(&[1, 2]).is_err());
        assert_eq!(
            RowSet::from_records(&[json!({"a": 1})]).unwrap().len(),
            1
        );
    }
}
