use super::{
    key_value, query_key, read_query_context, CompilerContextProvider, DateBounds, Resolved,
};
use crate::backend::{invoke, keys, CallParams};
use crate::compiler::ContextState;
use crate::model::{DatasetQuery, DateBoundary, QueryContext};
use crate::refs::{DatasetRef, QueryRef};
use crate::resolver::{dataset_context_procedure, AddressingMode};
use crate::user::UserContext;
use crate::CoreResult;
use cohort_types::Shape;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Everything the compiler needs to extract a dataset for a saved query's cohort.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetContext {
    pub query_context: QueryContext,
    pub dataset: Option<DatasetQuery>,
    pub requested_shape: Shape,
    /// Caller-supplied date range; replaces any date filter intrinsic to the panels.
    pub date_filter: Option<DateBoundary>,
}

impl CompilerContextProvider {
    /// Resolve a saved query and a dataset into a [`DatasetContext`].
    ///
    /// # Arguments
    ///
    /// * `user` - Caller identity, forwarded as authorization context.
    /// * `query` - The saved query whose cohort the dataset is extracted for.
    /// * `dataset` - The dataset and the shape the caller expects.
    /// * `bounds` - Early/late bounds; applied only when both are present.
    /// * `cancel` - Cancels the backend call.
    ///
    /// # Errors
    ///
    /// - `CoreError::Backend` if the call fails.
    /// - `CoreError::Cancelled` if `cancel` fires first.
    /// - `CoreError::RowDecode` / `CoreError::MissingRowSet` on a malformed reply.
    pub async fn dataset_context(
        &self,
        user: &UserContext,
        query: &QueryRef,
        dataset: &DatasetRef,
        bounds: DateBounds,
        cancel: &CancellationToken,
    ) -> CoreResult<Resolved<DatasetContext>> {
        let procedure = dataset_context_procedure(query.mode(), dataset.mode());
        let dataset_key = match dataset.mode() {
            AddressingMode::ById => keys::DATASET_ID,
            AddressingMode::ByUniversalId => keys::DATASET_UID,
        };

        let params = CallParams::for_user(user)
            .with(query_key(query), key_value(query.reference()))
            .with(dataset_key, key_value(dataset.reference()));
        let subject = format!("query {query} / dataset {}", dataset.reference());

        let mut reader = invoke(self.backend(), procedure, params, subject, cancel).await?;
        let query_context = read_query_context(&mut reader, query)?;
        let resolved = reader.read_first::<DatasetQuery>()?;

        let state = ContextState::for_dataset(
            query_context.found,
            resolved.as_ref().map(|d| d.shape),
            dataset.shape,
        );

        Ok(Resolved {
            context: DatasetContext {
                query_context,
                dataset: resolved,
                requested_shape: dataset.shape,
                date_filter: DateBoundary::from_bounds(bounds.early, bounds.late),
            },
            state,
        })
    }
}
