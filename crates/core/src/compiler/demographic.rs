use super::{key_value, query_key, read_query_context, CompilerContextProvider, Resolved};
use crate::backend::{invoke, CallParams};
use crate::compiler::ContextState;
use crate::model::{DemographicQuery, QueryContext};
use crate::refs::QueryRef;
use crate::resolver::demographic_context_procedure;
use crate::user::UserContext;
use crate::CoreResult;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicContext {
    pub query_context: QueryContext,
    pub demographic_query: Option<DemographicQuery>,
}

impl CompilerContextProvider {
    /// Resolve a saved query into a [`DemographicContext`].
    ///
    /// Only the query reference varies, so dispatch is two-way. A node without a configured
    /// demographic query reports `DATASET_NOT_FOUND`.
    pub async fn demographic_context(
        &self,
        user: &UserContext,
        query: &QueryRef,
        cancel: &CancellationToken,
    ) -> CoreResult<Resolved<DemographicContext>> {
        let procedure = demographic_context_procedure(query.mode());
        let params =
            CallParams::for_user(user).with(query_key(query), key_value(query.reference()));
        let subject = format!("query {query} / demographics");

        let mut reader = invoke(self.backend(), procedure, params, subject, cancel).await?;
        let query_context = read_query_context(&mut reader, query)?;
        let demographic_query = reader.read_first::<DemographicQuery>()?;

        let state = ContextState::for_target(
            query_context.found,
            demographic_query.is_some(),
            ContextState::DATASET_NOT_FOUND,
        );

        Ok(Resolved {
            context: DemographicContext {
                query_context,
                demographic_query,
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
    use uuid::Uuid;

    #[tokio::test]
    async fn test_two_way_dispatch() {
        let backend = Arc::new(ScriptedBackend::new());
        let provider = CompilerContextProvider::new(backend.clone());
        let cancel = CancellationToken::new();

        provider
            .demographic_context(&user(), &QueryRef::by_id(Uuid::new_v4()), &cancel)
            .await
            .unwrap();
        provider
            .demographic_context(&user(), &QueryRef::parse("urn:cohort:query:q").unwrap(), &cancel)
            .await
            .unwrap();

        assert_eq!(backend.call_count(Procedure::DemographicContextById), 1);
        assert_eq!(backend.call_count(Procedure::DemographicContextByUid), 1);
    }

    #[tokio::test]
    async fn test_resolves_demographic_query() {
        let backend = ScriptedBackend::new().reply(
            Procedure::DemographicContextById,
            vec![
                rows(&[query_row()]),
                rows(&[DemographicQuery {
                    sql_statement: "SELECT person_id FROM person".into(),
                    columns: vec!["person_id".into()],
                }]),
            ],
        );
        let provider = CompilerContextProvider::new(Arc::new(backend));

        let resolved = provider
            .demographic_context(
                &user(),
                &QueryRef::by_id(Uuid::new_v4()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(resolved.state.is_ok());
        assert_eq!(
            resolved.context.demographic_query.unwrap().columns,
            vec!["person_id"]
        );
    }
}
