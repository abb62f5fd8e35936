use super::{
    key_value, query_key, read_query_context, CompilerContextProvider, DateBounds, Resolved,
};
use crate::backend::rows::{ConceptRecord, SpecializationGroupRecord};
use crate::backend::{invoke, keys, CallParams};
use crate::compiler::ContextState;
use crate::hydrate::hydrate_concepts;
use crate::model::{
    Concept, DateBoundary, ItemResource, Panel, PanelItem, QueryContext, Specialization,
};
use crate::refs::{ConceptRef, QueryRef};
use crate::resolver::{concept_dataset_context_procedure, AddressingMode};
use crate::user::UserContext;
use crate::CoreResult;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// A saved query plus a single concept whose events are extracted as a dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptDatasetContext {
    pub query_context: QueryContext,
    pub concept: Option<Concept>,
    /// One-item panel over the concept, carrying the date override if any.
    pub panel: Panel,
}

impl ConceptDatasetContext {
    pub fn panel_item(&self) -> Option<&PanelItem> {
        self.panel.items().next()
    }
}

impl CompilerContextProvider {
    /// Resolve a saved query and a concept into a [`ConceptDatasetContext`].
    ///
    /// A missing or unauthorized concept is reported as `DATASET_NOT_FOUND`, since the concept
    /// stands in for the dataset here.
    ///
    /// # Errors
    ///
    /// Same as [`CompilerContextProvider::dataset_context`].
    pub async fn concept_dataset_context(
        &self,
        user: &UserContext,
        query: &QueryRef,
        concept: &ConceptRef,
        bounds: DateBounds,
        cancel: &CancellationToken,
    ) -> CoreResult<Resolved<ConceptDatasetContext>> {
        let procedure = concept_dataset_context_procedure(query.mode(), concept.mode());
        let concept_key = match concept.mode() {
            AddressingMode::ById => keys::CONCEPT_ID,
            AddressingMode::ByUniversalId => keys::CONCEPT_UID,
        };

        let params = CallParams::for_user(user)
            .with(query_key(query), key_value(query.reference()))
            .with(concept_key, key_value(concept.reference()));
        let subject = format!("query {query} / concept {concept}");

        let mut reader = invoke(self.backend(), procedure, params, subject, cancel).await?;
        let query_context = read_query_context(&mut reader, query)?;
        let concepts = reader.read::<ConceptRecord>()?;
        let groups = reader.read::<SpecializationGroupRecord>()?;
        let specializations = reader.read::<Specialization>()?;

        let resolved = hydrate_concepts(concepts, groups, specializations)
            .into_iter()
            .next();

        let state = ContextState::for_target(
            query_context.found,
            resolved.is_some(),
            ContextState::DATASET_NOT_FOUND,
        );

        let item = PanelItem::new(ItemResource::Concept(concept.clone()));
        let panel = Panel::single_item(item, DateBoundary::from_bounds(bounds.early, bounds.late));

        Ok(Resolved {
            context: ConceptDatasetContext {
                query_context,
                concept: resolved,
                panel,
            },
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::{rows, ScriptedBackend};
    use crate::backend::Procedure;
    use crate::compiler::fixtures::{query_row, user};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use uuid::Uuid;

    fn concept_row(id: Uuid) -> ConceptRecord {
        ConceptRecord {
            id,
            parent_id: None,
            root_id: id,
            universal_id: None,
            is_numeric: false,
            is_event_based: true,
            is_parent: false,
            is_encounter_based: true,
            is_specializable: true,
            is_patient_count_autocalculated: false,
            sql_set_from: Some("dbo.diagnosis".into()),
            sql_set_where: None,
            sql_field_date: Some("diagnosis_date".into()),
            sql_field_numeric: None,
            sql_field_event: None,
            ui_display_name: "Diabetes".into(),
            ui_display_text: None,
        }
    }

    #[tokio::test]
    async fn test_each_combination_calls_exactly_one_procedure() {
        let id = Uuid::new_v4().to_string();
        let cases = [
            (id.as_str(), id.as_str(), Procedure::ConceptDatasetContextById),
            (
                id.as_str(),
                "urn:cohort:concept:e11",
                Procedure::ConceptDatasetContextByQueryIdConceptUid,
            ),
            (
                "urn:cohort:query:q1",
                id.as_str(),
                Procedure::ConceptDatasetContextByQueryUidConceptId,
            ),
            (
                "urn:cohort:query:q1",
                "urn:cohort:concept:e11",
                Procedure::ConceptDatasetContextByUid,
            ),
        ];

        for (q, c, expected) in cases {
            let backend = Arc::new(ScriptedBackend::new());
            let provider = CompilerContextProvider::new(backend.clone());
            let query = QueryRef::parse(q).unwrap();
            let concept = ConceptRef::parse(c).unwrap();

            provider
                .concept_dataset_context(
                    &user(),
                    &query,
                    &concept,
                    DateBounds::default(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            let calls = backend.calls();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].0, expected);
            for other in Procedure::ALL.into_iter().filter(|p| *p != expected) {
                assert_eq!(backend.call_count(other), 0);
            }
        }
    }

    #[tokio::test]
    async fn test_mixed_addressing_passes_matching_keys() {
        let backend = Arc::new(ScriptedBackend::new());
        let provider = CompilerContextProvider::new(backend.clone());
        let query = QueryRef::parse("urn:cohort:query:q1").unwrap();
        let concept = ConceptRef::by_id(Uuid::new_v4());

        provider
            .concept_dataset_context(
                &user(),
                &query,
                &concept,
                DateBounds::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let params = &backend.calls()[0].1;
        assert_eq!(params.get_str(keys::QUERY_UID), Some("urn:cohort:query:q1"));
        assert!(params.get_str(keys::CONCEPT_ID).is_some());
        assert!(params.get_str(keys::CONCEPT_UID).is_none());
    }

    #[tokio::test]
    async fn test_hydrates_concept_and_applies_dates() {
        let id = Uuid::new_v4();
        let group = SpecializationGroupRecord {
            id: 4,
            concept_id: id,
            sql_set_from: None,
            ui_default_text: "Any".into(),
        };
        let backend = Arc::new(ScriptedBackend::new().reply(
            Procedure::ConceptDatasetContextById,
            vec![
                rows(&[query_row()]),
                rows(&[concept_row(id)]),
                rows(&[group]),
                rows::<Specialization>(&[]),
            ],
        ));
        let provider = CompilerContextProvider::new(backend);
        let query = QueryRef::by_id(Uuid::new_v4());
        let concept = ConceptRef::by_id(id);
        let bounds = DateBounds {
            early: NaiveDate::from_ymd_opt(2019, 1, 1),
            late: NaiveDate::from_ymd_opt(2019, 6, 30),
        };

        let resolved = provider
            .concept_dataset_context(&user(), &query, &concept, bounds, &CancellationToken::new())
            .await
            .unwrap();

        assert!(resolved.state.is_ok());
        let hydrated = resolved.context.concept.as_ref().unwrap();
        assert_eq!(hydrated.specialization_groups.len(), 1);
        assert!(hydrated.specialization_groups[0].specializations.is_empty());
        assert!(resolved.context.panel.date_filter.is_some());
        assert!(matches!(
            resolved.context.panel_item().unwrap().resource,
            ItemResource::Concept(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_concept_is_dataset_not_found() {
        let backend = Arc::new(ScriptedBackend::new().reply(
            Procedure::ConceptDatasetContextById,
            vec![
                rows(&[query_row()]),
                rows::<ConceptRecord>(&[]),
                rows::<SpecializationGroupRecord>(&[]),
                rows::<Specialization>(&[]),
            ],
        ));
        let provider = CompilerContextProvider::new(backend);

        let resolved = provider
            .concept_dataset_context(
                &user(),
                &QueryRef::by_id(Uuid::new_v4()),
                &ConceptRef::by_id(Uuid::new_v4()),
                DateBounds::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(resolved.state, ContextState::DATASET_NOT_FOUND);
    }
}
