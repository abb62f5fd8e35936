//! Test backend returning canned row sets and recording every call.

use super::{Backend, BackendError, CallParams, Procedure, RowSet, RowSets};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// Unscripted procedures answer with this many empty row sets.
const UNSCRIPTED_ROW_SETS: usize = 4;

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<HashMap<Procedure, RowSets>>,
    failures: Mutex<HashMap<Procedure, String>>,
    calls: Mutex<Vec<(Procedure, CallParams)>>,
    hang: bool,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A backend whose calls never complete, for cancellation tests.
    pub(crate) fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub(crate) fn reply(self, procedure: Procedure, sets: Vec<RowSet>) -> Self {
        self.replies.lock().insert(procedure, RowSets(sets));
        self
    }

    pub(crate) fn fail(self, procedure: Procedure, message: &str) -> Self {
        self.failures.lock().insert(procedure, message.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Procedure, CallParams)> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self, procedure: Procedure) -> usize {
        self.calls.lock().iter().filter(|(p, _)| *p == procedure).count()
    }
}

/// Builds a row set from serialisable records.
pub(crate) fn rows<T: Serialize>(records: &[T]) -> RowSet {
    RowSet::from_records(records).expect("test records serialise to objects")
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn call(
        &self,
        procedure: Procedure,
        params: CallParams,
    ) -> Result<RowSets, BackendError> {
        self.calls.lock().push((procedure, params));

        if self.hang {
            std::future::pending::<()>().await;
        }

        if let Some(message) = self.failures.lock().get(&procedure) {
            return Err(BackendError::Unavailable(message.clone()));
        }

        Ok(self
            .replies
            .lock()
            .get(&procedure)
            .cloned()
            .unwrap_or_else(|| RowSets(vec![RowSet::default(); UNSCRIPTED_ROW_SETS])))
    }
}
