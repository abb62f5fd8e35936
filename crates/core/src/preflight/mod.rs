//! Preflight: presence and authorization of every resource a query would touch.
//!
//! A bundle is split by addressing mode. Each mode gets one batched backend call carrying
//! all of its concept, query and import keys; the two calls run concurrently. The reply
//! row sets are read in order:
//!
//! 1. concept verdicts,
//! 2. saved-query verdicts joined with each query's nested concept verdicts,
//! 3. import verdicts,
//! 4. global panel filters.
//!
//! Every requested reference yields exactly one result entry, in request order. A reference
//! the backend did not answer for is reported as not present and not authorized.

mod results;

pub use results::{
    ConceptPreflightCheck, ConceptPreflightCheckResult, FailureReason, GlobalPanelFilter,
    ImportPreflightCheckResult, PreflightFailure, PreflightImports, PreflightQueries,
    PreflightResources, QueryPreflightCheckResult,
};

use crate::backend::rows::{
    ConceptPreflightRecord, ImportPreflightRecord, QueryConceptPreflightRecord,
};
use crate::backend::{invoke, keys, Backend, CallParams};
use crate::refs::{ResourceRef, ResourceRefs};
use crate::resolver::{preflight_procedure, AddressingMode};
use crate::user::UserContext;
use crate::CoreResult;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The references of one addressing mode.
#[derive(Debug, Default)]
struct Batch {
    concepts: Vec<ResourceRef>,
    queries: Vec<ResourceRef>,
    imports: Vec<ResourceRef>,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.queries.is_empty() && self.imports.is_empty()
    }

    fn len(&self) -> usize {
        self.concepts.len() + self.queries.len() + self.imports.len()
    }
}

/// Decoded reply to one batched preflight call.
#[derive(Debug, Default)]
struct BatchReply {
    concepts: Vec<ConceptPreflightRecord>,
    queries: Vec<QueryConceptPreflightRecord>,
    imports: Vec<ImportPreflightRecord>,
    filters: Vec<GlobalPanelFilter>,
}

/// Runs preflight checks against a backend.
#[derive(Clone)]
pub struct PreflightChecker {
    backend: Arc<dyn Backend>,
}

impl PreflightChecker {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Checks every reference in `refs`, plus the nested concepts of each saved query.
    ///
    /// Duplicate references are collapsed first. An empty bundle still makes one by-id call
    /// so the global panel filters are returned.
    ///
    /// # Errors
    ///
    /// - `CoreError::Backend` if either batched call fails.
    /// - `CoreError::Cancelled` if `cancel` fires first.
    /// - `CoreError::RowDecode` / `CoreError::MissingRowSet` on a malformed reply.
    pub async fn check(
        &self,
        user: &UserContext,
        refs: &ResourceRefs,
        cancel: &CancellationToken,
    ) -> CoreResult<PreflightResources> {
        let refs = refs.clone().deduplicated();

        let mut by_id = Batch::default();
        let mut by_uid = Batch::default();
        for concept in &refs.concepts {
            split(&mut by_id, &mut by_uid, concept.reference(), |b| &mut b.concepts);
        }
        for query in &refs.queries {
            split(&mut by_id, &mut by_uid, query.reference(), |b| &mut b.queries);
        }
        for import in &refs.imports {
            split(&mut by_id, &mut by_uid, import.reference(), |b| &mut b.imports);
        }

        let run_by_id = !by_id.is_empty() || by_uid.is_empty();
        let run_by_uid = !by_uid.is_empty();

        let (id_reply, uid_reply) = tokio::try_join!(
            self.run_batch(user, AddressingMode::ById, &by_id, run_by_id, cancel),
            self.run_batch(user, AddressingMode::ByUniversalId, &by_uid, run_by_uid, cancel),
        )?;

        let reply_for = |reference: &ResourceRef| match reference.mode() {
            AddressingMode::ById => &id_reply,
            AddressingMode::ByUniversalId => &uid_reply,
        };

        let concepts = refs
            .concepts
            .iter()
            .map(|r| concept_result(r.reference(), &reply_for(r.reference()).concepts))
            .collect();

        let queries = refs
            .queries
            .iter()
            .map(|r| query_result(r.reference(), &reply_for(r.reference()).queries))
            .collect();

        let imports = refs
            .imports
            .iter()
            .map(|r| import_result(r.reference(), &reply_for(r.reference()).imports))
            .collect();

        let mut seen = HashSet::new();
        let global_panel_filters = id_reply
            .filters
            .iter()
            .chain(uid_reply.filters.iter())
            .filter(|f| seen.insert(f.id))
            .cloned()
            .collect();

        let resources = PreflightResources {
            concepts: ConceptPreflightCheck { results: concepts },
            queries: PreflightQueries { results: queries },
            imports: PreflightImports { results: imports },
            global_panel_filters,
        };

        tracing::debug!(
            user = %user.qualified_name(),
            requested = by_id.len() + by_uid.len(),
            ok = resources.ok(),
            "preflight complete"
        );

        Ok(resources)
    }

    async fn run_batch(
        &self,
        user: &UserContext,
        mode: AddressingMode,
        batch: &Batch,
        run: bool,
        cancel: &CancellationToken,
    ) -> CoreResult<BatchReply> {
        if !run {
            return Ok(BatchReply::default());
        }

        let (concept_key, query_key, import_key) = match mode {
            AddressingMode::ById => (keys::CONCEPT_IDS, keys::QUERY_IDS, keys::IMPORT_IDS),
            AddressingMode::ByUniversalId => {
                (keys::CONCEPT_UIDS, keys::QUERY_UIDS, keys::IMPORT_UIDS)
            }
        };

        let params = CallParams::for_user(user)
            .with(concept_key, key_list(&batch.concepts, mode))
            .with(query_key, key_list(&batch.queries, mode))
            .with(import_key, key_list(&batch.imports, mode));
        let subject = format!(
            "preflight of {} concepts, {} queries, {} imports",
            batch.concepts.len(),
            batch.queries.len(),
            batch.imports.len()
        );

        let procedure = preflight_procedure(mode);
        let mut reader = invoke(self.backend.as_ref(), procedure, params, subject, cancel).await?;

        Ok(BatchReply {
            concepts: reader.read()?,
            queries: reader.read()?,
            imports: reader.read()?,
            filters: reader.read()?,
        })
    }
}

fn split(
    by_id: &mut Batch,
    by_uid: &mut Batch,
    reference: &ResourceRef,
    kind: impl Fn(&mut Batch) -> &mut Vec<ResourceRef>,
) {
    let batch = match reference.mode() {
        AddressingMode::ById => by_id,
        AddressingMode::ByUniversalId => by_uid,
    };
    kind(batch).push(reference.clone());
}

/// The keys of `refs` under `mode`, as a JSON string array. References without a key for
/// the mode are left out and later reported as not present.
fn key_list(refs: &[ResourceRef], mode: AddressingMode) -> Value {
    let keys = refs.iter().filter_map(|r| match mode {
        AddressingMode::ById => r.id.map(|id| id.to_string()),
        AddressingMode::ByUniversalId => r.universal_id.as_ref().map(ToString::to_string),
    });
    Value::Array(keys.map(Value::String).collect())
}

fn concept_result(
    reference: &ResourceRef,
    rows: &[ConceptPreflightRecord],
) -> ConceptPreflightCheckResult {
    rows.iter()
        .find(|row| reference.matches(row.id.as_ref(), row.universal_id.as_ref()))
        .map(|row| ConceptPreflightCheckResult {
            id: row.id.or(reference.id),
            universal_id: row.universal_id.clone().or_else(|| reference.universal_id.clone()),
            is_present: row.is_present,
            is_authorized: row.is_authorized,
        })
        .unwrap_or_else(|| ConceptPreflightCheckResult::absent(reference))
}

/// Groups the joined rows belonging to one saved query into a single verdict.
fn query_result(
    reference: &ResourceRef,
    rows: &[QueryConceptPreflightRecord],
) -> QueryPreflightCheckResult {
    let group: Vec<&QueryConceptPreflightRecord> = rows
        .iter()
        .filter(|row| reference.matches(row.query_id.as_ref(), row.query_universal_id.as_ref()))
        .collect();

    let Some(first) = group.first() else {
        return QueryPreflightCheckResult::absent(reference);
    };

    let concepts = group
        .iter()
        .filter(|row| row.has_concept())
        .map(|row| ConceptPreflightCheckResult {
            id: row.concept_id,
            universal_id: row.concept_universal_id.clone(),
            is_present: row.concept_is_present.unwrap_or(false),
            is_authorized: row.concept_is_authorized.unwrap_or(false),
        })
        .collect();

    QueryPreflightCheckResult {
        id: first.query_id.or(reference.id),
        universal_id: first
            .query_universal_id
            .clone()
            .or_else(|| reference.universal_id.clone()),
        version: first.query_ver,
        is_present: first.query_is_present,
        is_authorized: first.query_is_authorized,
        concepts: ConceptPreflightCheck { results: concepts },
    }
}

/// Only requested imports are echoed back; extra rows in the reply are ignored.
fn import_result(
    reference: &ResourceRef,
    rows: &[ImportPreflightRecord],
) -> ImportPreflightCheckResult {
    rows.iter()
        .find(|row| reference.matches(row.id.as_ref(), row.universal_id.as_ref()))
        .map(|row| ImportPreflightCheckResult {
            id: row.id.or(reference.id),
            universal_id: row.universal_id.clone().or_else(|| reference.universal_id.clone()),
            is_present: row.is_present,
            is_authorized: row.is_authorized,
        })
        .unwrap_or_else(|| ImportPreflightCheckResult::absent(reference))
}
