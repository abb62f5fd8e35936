use super::{key_value, query_key, read_query_context, CompilerContextProvider, Resolved};
use crate::backend::rows::DefinitionRecord;
use crate::backend::{invoke, CallParams};
use crate::compiler::ContextState;
use crate::model::panel::panel_at;
use crate::model::{Panel, QueryContext};
use crate::refs::QueryRef;
use crate::resolver::panel_context_procedure;
use crate::user::UserContext;
use crate::{CoreError, CoreResult};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// A saved query plus one panel taken from its stored definition.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelContext {
    pub query_context: QueryContext,
    pub panel_index: i64,
    pub panel: Option<Panel>,
}

impl CompilerContextProvider {
    /// Resolve a saved query and a panel index into a [`PanelContext`].
    ///
    /// The backend returns the query's stored definition (a JSON array of panels) and the
    /// panel is picked from it. A negative or out-of-range index yields no panel and the
    /// `PANEL_NOT_FOUND` state rather than an error.
    ///
    /// # Errors
    ///
    /// - `CoreError::DefinitionParse` if the stored definition is not a panel array.
    /// - Otherwise as [`CompilerContextProvider::dataset_context`].
    pub async fn panel_context(
        &self,
        user: &UserContext,
        query: &QueryRef,
        panel_index: i64,
        cancel: &CancellationToken,
    ) -> CoreResult<Resolved<PanelContext>> {
        let procedure = panel_context_procedure(query.mode());
        let params =
            CallParams::for_user(user).with(query_key(query), key_value(query.reference()));
        let subject = format!("query {query} / panel {panel_index}");

        let mut reader = invoke(self.backend(), procedure, params, subject, cancel).await?;
        let query_context = read_query_context(&mut reader, query)?;

        let panel = match reader.read_first::<DefinitionRecord>()? {
            Some(record) => {
                let panels: Vec<Panel> = serde_json::from_str(&record.definition).map_err(
                    |source| CoreError::DefinitionParse {
                        query: query.to_string(),
                        source,
                    },
                )?;
                panel_at(panels, panel_index)
            }
            None => None,
        };

        let state = ContextState::for_target(
            query_context.found,
            panel.is_some(),
            ContextState::PANEL_NOT_FOUND,
        );

        Ok(Resolved {
            context: PanelContext {
                query_context,
                panel_index,
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
    use std::sync::Arc;

    const DEFINITION: &str = r#"[
        {"index": 0, "subPanels": [{"panelItems": [
            {"resource": {"kind": "concept", "ref": {"universalId": "urn:cohort:concept:a"}}}
        ]}]},
        {"index": 1, "include": false, "subPanels": []}
    ]"#;

    fn provider_with(definition: &str) -> CompilerContextProvider {
        let backend = ScriptedBackend::new().reply(
            Procedure::PanelContextByUid,
            vec![
                rows(&[query_row()]),
                rows(&[DefinitionRecord {
                    definition: definition.into(),
                }]),
            ],
        );
        CompilerContextProvider::new(Arc::new(backend))
    }

    async fn resolve(
        provider: &CompilerContextProvider,
        index: i64,
    ) -> CoreResult<Resolved<PanelContext>> {
        let query = QueryRef::parse("urn:cohort:query:q1").unwrap();
        provider
            .panel_context(&user(), &query, index, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_extracts_panel_by_index() {
        let resolved = resolve(&provider_with(DEFINITION), 1).await.unwrap();

        assert!(resolved.state.is_ok());
        assert!(!resolved.context.panel.unwrap().include);
    }

    #[tokio::test]
    async fn test_out_of_range_and_negative_index_yield_none() {
        let provider = provider_with(DEFINITION);

        for index in [2, 99, -1] {
            let resolved = resolve(&provider, index).await.unwrap();
            assert!(resolved.context.panel.is_none());
            assert_eq!(resolved.state, ContextState::PANEL_NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_corrupt_definition_is_an_error() {
        let err = resolve(&provider_with("{not json"), 0).await.unwrap_err();

        assert!(matches!(err, CoreError::DefinitionParse { .. }));
    }

    #[tokio::test]
    async fn test_missing_query_sets_both_flags() {
        let backend = Arc::new(ScriptedBackend::new());
        let provider = CompilerContextProvider::new(backend.clone());

        let resolved = resolve(&provider, 0).await.unwrap();

        assert_eq!(
            resolved.state,
            ContextState::QUERY_NOT_FOUND | ContextState::PANEL_NOT_FOUND
        );
        assert_eq!(backend.call_count(Procedure::PanelContextByUid), 1);
    }
}
