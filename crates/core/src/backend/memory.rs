//! In-memory implementation of every procedure.
//!
//! Serves a [`Catalog`] with the same row-set layout a warehouse adapter returns, so the
//! providers and the preflight checker decode its output exactly as they would a remote reply.
//! Resources the caller may not see are omitted, which reads as "not found".

use super::catalog::{Catalog, CatalogConcept, CatalogQuery};
use super::rows::{
    ConceptPreflightRecord, DefinitionRecord, ImportPreflightRecord,
    QueryConceptPreflightRecord, QueryContextRecord, SpecializationGroupRecord,
};
use super::{keys, Backend, BackendError, CallParams, Procedure, RowSet, RowSets};
use crate::model::Specialization;
use crate::refs::{ResourceRef, ResourceRefs};
use async_trait::async_trait;
use cohort_urn::Urn;
use std::sync::Arc;
use uuid::Uuid;

/// A key read from call parameters. A null parameter matches nothing.
#[derive(Debug)]
enum Key {
    Id(Uuid),
    Uid(Urn),
    Null,
}

impl Key {
    fn matches(&self, id: &Uuid, universal_id: Option<&Urn>) -> bool {
        match self {
            Key::Id(k) => k == id,
            Key::Uid(k) => universal_id == Some(k),
            Key::Null => false,
        }
    }

    fn parse(raw: &str, by_uid: bool) -> Result<Self, BackendError> {
        if by_uid {
            Urn::parse(raw)
                .map(Key::Uid)
                .map_err(|e| BackendError::Rejected(e.to_string()))
        } else {
            Uuid::parse_str(raw)
                .map(Key::Id)
                .map_err(|e| BackendError::Rejected(format!("invalid id '{raw}': {e}")))
        }
    }

    fn required(
        params: &CallParams,
        id_key: &str,
        uid_key: &str,
        by_uid: bool,
    ) -> Result<Self, BackendError> {
        let name = if by_uid { uid_key } else { id_key };
        match params.get(name) {
            None => Err(BackendError::Rejected(format!("missing parameter '{name}'"))),
            Some(serde_json::Value::Null) => Ok(Key::Null),
            Some(value) => {
                let raw = value.as_str().ok_or_else(|| {
                    BackendError::Rejected(format!("parameter '{name}' must be a string"))
                })?;
                Self::parse(raw, by_uid)
            }
        }
    }

    fn list(
        params: &CallParams,
        id_key: &str,
        uid_key: &str,
        by_uid: bool,
    ) -> Result<Vec<Self>, BackendError> {
        let name = if by_uid { uid_key } else { id_key };
        params
            .get_str_list(name)
            .into_iter()
            .map(|raw| Self::parse(raw, by_uid))
            .collect()
    }
}

/// A [`Backend`] answering from an in-memory catalog.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    catalog: Arc<Catalog>,
}

impl MemoryBackend {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn find_query(&self, key: &Key, params: &CallParams) -> Option<&CatalogQuery> {
        self.catalog
            .queries
            .iter()
            .find(|q| key.matches(&q.id, q.universal_id.as_ref()))
            .filter(|q| q.visible_to(params))
    }

    fn find_concept(&self, key: &Key) -> Option<&CatalogConcept> {
        self.catalog
            .concepts
            .iter()
            .find(|c| key.matches(&c.record.id, c.record.universal_id.as_ref()))
    }

    fn find_concept_by_ref(&self, reference: &ResourceRef) -> Option<&CatalogConcept> {
        self.catalog
            .concepts
            .iter()
            .find(|c| reference.matches(Some(&c.record.id), c.record.universal_id.as_ref()))
    }

    fn query_context_rows(
        &self,
        key: &Key,
        params: &CallParams,
    ) -> Result<RowSet, BackendError> {
        let rows: Vec<QueryContextRecord> = self
            .find_query(key, params)
            .map(|q| QueryContextRecord {
                query_id: q.id,
                universal_id: q.universal_id.clone(),
                owner: Some(q.owner.clone()),
                ver: q.ver,
                pepper: q.pepper,
            })
            .into_iter()
            .collect();
        RowSet::from_records(&rows)
    }

    // ========================================================================
    // Context procedures
    // ========================================================================

    fn dataset_context(
        &self,
        params: &CallParams,
        query_by_uid: bool,
        dataset_by_uid: bool,
    ) -> Result<RowSets, BackendError> {
        let query = Key::required(params, keys::QUERY_ID, keys::QUERY_UID, query_by_uid)?;
        let dataset =
            Key::required(params, keys::DATASET_ID, keys::DATASET_UID, dataset_by_uid)?;

        let datasets: Vec<_> = self
            .catalog
            .datasets
            .iter()
            .filter(|d| dataset.matches(&d.query.id, d.query.universal_id.as_ref()))
            .filter(|d| d.visible_to(params))
            .map(|d| d.query.clone())
            .take(1)
            .collect();

        Ok(RowSets(vec![
            self.query_context_rows(&query, params)?,
            RowSet::from_records(&datasets)?,
        ]))
    }

    fn concept_dataset_context(
        &self,
        params: &CallParams,
        query_by_uid: bool,
        concept_by_uid: bool,
    ) -> Result<RowSets, BackendError> {
        let query = Key::required(params, keys::QUERY_ID, keys::QUERY_UID, query_by_uid)?;
        let concept_key =
            Key::required(params, keys::CONCEPT_ID, keys::CONCEPT_UID, concept_by_uid)?;

        let concept = self
            .find_concept(&concept_key)
            .filter(|c| c.visible_to(params));

        let mut concepts = Vec::new();
        let mut groups = Vec::new();
        let mut specializations = Vec::new();
        if let Some(c) = concept {
            concepts.push(c.record.clone());
            for g in &c.specialization_groups {
                groups.push(SpecializationGroupRecord {
                    id: g.id,
                    concept_id: c.record.id,
                    sql_set_from: g.sql_set_from.clone(),
                    ui_default_text: g.ui_default_text.clone(),
                });
                specializations.extend(g.specializations.iter().map(|s| Specialization {
                    id: s.id,
                    specialization_group_id: g.id,
                    universal_id: s.universal_id.clone(),
                    ui_display_text: s.ui_display_text.clone(),
                    sql_set_where: s.sql_set_where.clone(),
                    order: s.order,
                }));
            }
        }

        Ok(RowSets(vec![
            self.query_context_rows(&query, params)?,
            RowSet::from_records(&concepts)?,
            RowSet::from_records(&groups)?,
            RowSet::from_records(&specializations)?,
        ]))
    }

    fn panel_context(&self, params: &CallParams, by_uid: bool) -> Result<RowSets, BackendError> {
        let query = Key::required(params, keys::QUERY_ID, keys::QUERY_UID, by_uid)?;

        let definitions = match self.find_query(&query, params) {
            Some(q) => vec![DefinitionRecord {
                definition: serde_json::to_string(&q.definition)?,
            }],
            None => Vec::new(),
        };

        Ok(RowSets(vec![
            self.query_context_rows(&query, params)?,
            RowSet::from_records(&definitions)?,
        ]))
    }

    fn demographic_context(
        &self,
        params: &CallParams,
        by_uid: bool,
    ) -> Result<RowSets, BackendError> {
        let query = Key::required(params, keys::QUERY_ID, keys::QUERY_UID, by_uid)?;
        let demographics: Vec<_> = self.catalog.demographic_query.iter().cloned().collect();

        Ok(RowSets(vec![
            self.query_context_rows(&query, params)?,
            RowSet::from_records(&demographics)?,
        ]))
    }

    // ========================================================================
    // Preflight
    // ========================================================================

    fn preflight(&self, params: &CallParams, by_uid: bool) -> Result<RowSets, BackendError> {
        let concept_keys = Key::list(params, keys::CONCEPT_IDS, keys::CONCEPT_UIDS, by_uid)?;
        let query_keys = Key::list(params, keys::QUERY_IDS, keys::QUERY_UIDS, by_uid)?;
        let import_keys = Key::list(params, keys::IMPORT_IDS, keys::IMPORT_UIDS, by_uid)?;

        let concepts: Vec<_> = concept_keys
            .iter()
            .filter_map(|k| self.find_concept(k))
            .map(|c| ConceptPreflightRecord {
                id: Some(c.record.id),
                universal_id: c.record.universal_id.clone(),
                is_present: true,
                is_authorized: c.visible_to(params),
            })
            .collect();

        let mut queries = Vec::new();
        for key in &query_keys {
            let Some(query) = self
                .catalog
                .queries
                .iter()
                .find(|q| key.matches(&q.id, q.universal_id.as_ref()))
            else {
                continue;
            };
            queries.extend(self.query_preflight_rows(query, params));
        }

        let imports: Vec<_> = import_keys
            .iter()
            .filter_map(|k| {
                self.catalog
                    .imports
                    .iter()
                    .find(|i| k.matches(&i.id, i.universal_id.as_ref()))
            })
            .map(|i| ImportPreflightRecord {
                id: Some(i.id),
                universal_id: i.universal_id.clone(),
                is_present: true,
                is_authorized: i.visible_to(params),
            })
            .collect();

        let filters: Vec<_> = self
            .catalog
            .global_panel_filters
            .iter()
            .filter(|f| f.session_type.map_or(true, |s| s == params.session_type))
            .cloned()
            .collect();

        Ok(RowSets(vec![
            RowSet::from_records(&concepts)?,
            RowSet::from_records(&queries)?,
            RowSet::from_records(&imports)?,
            RowSet::from_records(&filters)?,
        ]))
    }

    /// One row per concept the saved query depends on, or one concept-less row.
    fn query_preflight_rows(
        &self,
        query: &CatalogQuery,
        params: &CallParams,
    ) -> Vec<QueryConceptPreflightRecord> {
        let base = QueryConceptPreflightRecord {
            query_id: Some(query.id),
            query_universal_id: query.universal_id.clone(),
            query_ver: query.ver,
            query_is_present: true,
            query_is_authorized: query.visible_to(params),
            concept_id: None,
            concept_universal_id: None,
            concept_is_present: None,
            concept_is_authorized: None,
        };

        let dependencies = ResourceRefs::from_panels(&query.definition).concepts;
        if dependencies.is_empty() {
            return vec![base];
        }

        dependencies
            .into_iter()
            .map(|dep| {
                let dep = dep.into_inner();
                match self.find_concept_by_ref(&dep) {
                    Some(c) => QueryConceptPreflightRecord {
                        concept_id: Some(c.record.id),
                        concept_universal_id: c.record.universal_id.clone(),
                        concept_is_present: Some(true),
                        concept_is_authorized: Some(c.visible_to(params)),
                        ..base.clone()
                    },
                    None => QueryConceptPreflightRecord {
                        concept_id: dep.id,
                        concept_universal_id: dep.universal_id,
                        concept_is_present: Some(false),
                        concept_is_authorized: Some(false),
                        ..base.clone()
                    },
                }
            })
            .collect()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn call(
        &self,
        procedure: Procedure,
        params: CallParams,
    ) -> Result<RowSets, BackendError> {
        match procedure {
            Procedure::DatasetContextById => self.dataset_context(&params, false, false),
            Procedure::DatasetContextByQueryIdDatasetUid => {
                self.dataset_context(&params, false, true)
            }
            Procedure::DatasetContextByQueryUidDatasetId => {
                self.dataset_context(&params, true, false)
            }
            Procedure::DatasetContextByUid => self.dataset_context(&params, true, true),
            Procedure::ConceptDatasetContextById => {
                self.concept_dataset_context(&params, false, false)
            }
            Procedure::ConceptDatasetContextByQueryIdConceptUid => {
                self.concept_dataset_context(&params, false, true)
            }
            Procedure::ConceptDatasetContextByQueryUidConceptId => {
                self.concept_dataset_context(&params, true, false)
            }
            Procedure::ConceptDatasetContextByUid => {
                self.concept_dataset_context(&params, true, true)
            }
            Procedure::PanelContextById => self.panel_context(&params, false),
            Procedure::PanelContextByUid => self.panel_context(&params, true),
            Procedure::DemographicContextById => self.demographic_context(&params, false),
            Procedure::DemographicContextByUid => self.demographic_context(&params, true),
            Procedure::PreflightByIds => self.preflight(&params, false),
            Procedure::PreflightByUids => self.preflight(&params, true),
        }
    }
}
