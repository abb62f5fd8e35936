//! Reference resolution and procedure dispatch.
//!
//! [`resolve`] decides how a single reference is looked up. The dispatch tables below map the
//! addressing modes of the one or two references an operation needs onto exactly one backend
//! procedure. Tables are indexed by [`AddressingMode::index`], so every combination is covered
//! at compile time.

use crate::backend::Procedure;
use crate::refs::ResourceRef;
use serde::Serialize;

/// How a reference is looked up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AddressingMode {
    ById,
    ByUniversalId,
}

impl AddressingMode {
    pub const ALL: [AddressingMode; 2] = [AddressingMode::ById, AddressingMode::ByUniversalId];

    /// Row/column index into the dispatch tables.
    pub const fn index(self) -> usize {
        match self {
            AddressingMode::ById => 0,
            AddressingMode::ByUniversalId => 1,
        }
    }
}

/// Chooses the addressing mode for a reference.
///
/// A URN, when present, always wins over a local id. Never fails: a reference carrying
/// neither is looked up by id and comes back not found.
pub fn resolve(reference: &ResourceRef) -> AddressingMode {
    if reference.universal_id.is_some() {
        AddressingMode::ByUniversalId
    } else {
        AddressingMode::ById
    }
}

// ============================================================================
// Dispatch tables: [query mode][secondary mode]
// ============================================================================

const DATASET_CONTEXT: [[Procedure; 2]; 2] = [
    [
        Procedure::DatasetContextById,
        Procedure::DatasetContextByQueryIdDatasetUid,
    ],
    [
        Procedure::DatasetContextByQueryUidDatasetId,
        Procedure::DatasetContextByUid,
    ],
];

const CONCEPT_DATASET_CONTEXT: [[Procedure; 2]; 2] = [
    [
        Procedure::ConceptDatasetContextById,
        Procedure::ConceptDatasetContextByQueryIdConceptUid,
    ],
    [
        Procedure::ConceptDatasetContextByQueryUidConceptId,
        Procedure::ConceptDatasetContextByUid,
    ],
];

const PANEL_CONTEXT: [Procedure; 2] = [Procedure::PanelContextById, Procedure::PanelContextByUid];

const DEMOGRAPHIC_CONTEXT: [Procedure; 2] = [
    Procedure::DemographicContextById,
    Procedure::DemographicContextByUid,
];

const PREFLIGHT: [Procedure; 2] = [Procedure::PreflightByIds, Procedure::PreflightByUids];

pub fn dataset_context_procedure(query: AddressingMode, dataset: AddressingMode) -> Procedure {
    DATASET_CONTEXT[query.index()][dataset.index()]
}

pub fn concept_dataset_context_procedure(
    query: AddressingMode,
    concept: AddressingMode,
) -> Procedure {
    CONCEPT_DATASET_CONTEXT[query.index()][concept.index()]
}

pub fn panel_context_procedure(query: AddressingMode) -> Procedure {
    PANEL_CONTEXT[query.index()]
}

pub fn demographic_context_procedure(query: AddressingMode) -> Procedure {
    DEMOGRAPHIC_CONTEXT[query.index()]
}

pub fn preflight_procedure(mode: AddressingMode) -> Procedure {
    PREFLIGHT[mode.index()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_urn::Urn;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[test]
    fn test_resolve_urn_only() {
        let r = ResourceRef::by_urn(Urn::parse("urn:cohort:query:q1").unwrap());

        assert_eq!(resolve(&r), AddressingMode::ByUniversalId);
    }

    #[test]
    fn test_resolve_id_only() {
        let r = ResourceRef::by_id(Uuid::new_v4());

        assert_eq!(resolve(&r), AddressingMode::ById);
    }

    #[test]
    fn test_resolve_prefers_urn_when_both_present() {
        let r = ResourceRef {
            id: Some(Uuid::new_v4()),
            universal_id: Some(Urn::parse("urn:cohort:query:q1").unwrap()),
        };

        assert_eq!(resolve(&r), AddressingMode::ByUniversalId);
    }

    #[test]
    fn test_resolve_empty_reference_falls_back_to_id() {
        assert_eq!(resolve(&ResourceRef::default()), AddressingMode::ById);
    }

    #[test]
    fn test_two_way_tables_are_distinct() {
        let mut seen = HashSet::new();
        for q in AddressingMode::ALL {
            for s in AddressingMode::ALL {
                assert!(seen.insert(dataset_context_procedure(q, s)));
                assert!(seen.insert(concept_dataset_context_procedure(q, s)));
            }
            assert!(seen.insert(panel_context_procedure(q)));
            assert!(seen.insert(demographic_context_procedure(q)));
            assert!(seen.insert(preflight_procedure(q)));
        }

        assert_eq!(seen.len(), Procedure::ALL.len());
    }

    #[test]
    fn test_dataset_table_orientation() {
        assert_eq!(
            dataset_context_procedure(AddressingMode::ById, AddressingMode::ByUniversalId),
            Procedure::DatasetContextByQueryIdDatasetUid
        );
        assert_eq!(
            dataset_context_procedure(AddressingMode::ByUniversalId, AddressingMode::ById),
            Procedure::DatasetContextByQueryUidDatasetId
        );
    }
}
