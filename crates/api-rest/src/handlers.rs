//! Thin controllers over the core services.
//!
//! Each handler parses references, calls exactly one core operation and maps its outcome to
//! a status code. Context states map as: ok to 200, any not-found flag to 404, shape mismatch
//! to 400.

use crate::dto::{ContextRes, HealthRes, PreflightReq, PreflightRes, SubmitReq, SubmitRes};
use crate::error::ApiError;
use crate::identity::Caller;
use crate::AppState;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::NaiveDate;
use cohort_core::model::FederatedQuery;
use cohort_core::{
    ConceptRef, CorrelationId, DatasetRef, DateBounds, FederationService, ImportRef, PollOutcome,
    QueryRef, Resolved, ResourceRefs,
};
use cohort_types::Shape;
use hub::DeliveryEnvelope;
use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, DropGuard};
use utoipa::IntoParams;

/// A token cancelled when the handler future is dropped, e.g. on client disconnect.
fn request_token() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

fn context_response<C: Serialize>(
    resolved: Resolved<C>,
) -> Result<(StatusCode, Json<ContextRes>), ApiError> {
    let status = if resolved.state.is_ok() {
        StatusCode::OK
    } else if resolved.state.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };

    let context = serde_json::to_value(&resolved.context).map_err(|e| {
        tracing::error!("Context serialisation error: {e}");
        ApiError::Internal
    })?;

    Ok((
        status,
        Json(ContextRes {
            context,
            state: resolved.state.labels().into_iter().map(String::from).collect(),
        }),
    ))
}

fn federation(state: &AppState) -> Result<&FederationService, ApiError> {
    state
        .federation
        .as_ref()
        .ok_or_else(|| cohort_core::CoreError::FederationDisabled.into())
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DateParams {
    /// Start of the date override; used only together with `late`.
    pub early: Option<NaiveDate>,
    /// End of the date override; used only together with `early`.
    pub late: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DatasetParams {
    /// Shape the caller expects the dataset to have.
    pub shape: String,
    pub early: Option<NaiveDate>,
    pub late: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Cohort REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/queries/{query}/datasets/{dataset}",
    params(
        ("query" = String, Path, description = "Saved query URN or local id"),
        ("dataset" = String, Path, description = "Dataset URN or local id"),
        DatasetParams
    ),
    responses(
        (status = 200, description = "Dataset context resolved", body = ContextRes),
        (status = 400, description = "Malformed reference or shape mismatch", body = ContextRes),
        (status = 404, description = "Query or dataset not found", body = ContextRes)
    )
)]
/// Resolve a saved query and a dataset into a dataset extraction context
///
/// # Errors
/// Returns `400 Bad Request` if a reference or the shape is malformed.
#[axum::debug_handler]
pub async fn dataset_context(
    State(state): State<AppState>,
    Caller(user): Caller,
    AxumPath((query, dataset)): AxumPath<(String, String)>,
    Query(params): Query<DatasetParams>,
) -> Result<(StatusCode, Json<ContextRes>), ApiError> {
    let query = QueryRef::parse(&query)?;
    let shape = Shape::parse(&params.shape).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let dataset = DatasetRef::parse(&dataset, shape)?;
    let bounds = DateBounds {
        early: params.early,
        late: params.late,
    };

    let (cancel, _guard) = request_token();
    let resolved = state
        .contexts
        .dataset_context(&user, &query, &dataset, bounds, &cancel)
        .await?;

    context_response(resolved)
}

#[utoipa::path(
    get,
    path = "/queries/{query}/concepts/{concept}",
    params(
        ("query" = String, Path, description = "Saved query URN or local id"),
        ("concept" = String, Path, description = "Concept URN or local id"),
        DateParams
    ),
    responses(
        (status = 200, description = "Concept dataset context resolved", body = ContextRes),
        (status = 400, description = "Malformed reference"),
        (status = 404, description = "Query or concept not found", body = ContextRes)
    )
)]
/// Resolve a saved query and a concept into a concept dataset context
pub async fn concept_context(
    State(state): State<AppState>,
    Caller(user): Caller,
    AxumPath((query, concept)): AxumPath<(String, String)>,
    Query(params): Query<DateParams>,
) -> Result<(StatusCode, Json<ContextRes>), ApiError> {
    let query = QueryRef::parse(&query)?;
    let concept = ConceptRef::parse(&concept)?;
    let bounds = DateBounds {
        early: params.early,
        late: params.late,
    };

    let (cancel, _guard) = request_token();
    let resolved = state
        .contexts
        .concept_dataset_context(&user, &query, &concept, bounds, &cancel)
        .await?;

    context_response(resolved)
}

#[utoipa::path(
    get,
    path = "/queries/{query}/panels/{index}",
    params(
        ("query" = String, Path, description = "Saved query URN or local id"),
        ("index" = i64, Path, description = "Zero-based panel index")
    ),
    responses(
        (status = 200, description = "Panel context resolved", body = ContextRes),
        (status = 400, description = "Malformed reference"),
        (status = 404, description = "Query or panel not found", body = ContextRes)
    )
)]
/// Resolve a saved query and a panel index into a panel context
pub async fn panel_context(
    State(state): State<AppState>,
    Caller(user): Caller,
    AxumPath((query, index)): AxumPath<(String, i64)>,
) -> Result<(StatusCode, Json<ContextRes>), ApiError> {
    let query = QueryRef::parse(&query)?;

    let (cancel, _guard) = request_token();
    let resolved = state
        .contexts
        .panel_context(&user, &query, index, &cancel)
        .await?;

    context_response(resolved)
}

#[utoipa::path(
    get,
    path = "/queries/{query}/demographics",
    params(
        ("query" = String, Path, description = "Saved query URN or local id")
    ),
    responses(
        (status = 200, description = "Demographic context resolved", body = ContextRes),
        (status = 400, description = "Malformed reference"),
        (status = 404, description = "Query or demographic query not found", body = ContextRes)
    )
)]
/// Resolve a saved query into a demographic context
pub async fn demographic_context(
    State(state): State<AppState>,
    Caller(user): Caller,
    AxumPath(query): AxumPath<String>,
) -> Result<(StatusCode, Json<ContextRes>), ApiError> {
    let query = QueryRef::parse(&query)?;

    let (cancel, _guard) = request_token();
    let resolved = state
        .contexts
        .demographic_context(&user, &query, &cancel)
        .await?;

    context_response(resolved)
}

#[utoipa::path(
    post,
    path = "/preflight",
    request_body = PreflightReq,
    responses(
        (status = 200, description = "Per-item presence and authorization", body = PreflightRes),
        (status = 400, description = "Malformed reference")
    )
)]
/// Check presence and authorization of every referenced resource
///
/// Saved queries are checked together with the concepts they depend on.
#[axum::debug_handler]
pub async fn preflight(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(req): Json<PreflightReq>,
) -> Result<Json<PreflightRes>, ApiError> {
    let refs = ResourceRefs {
        concepts: req.concepts.iter().map(|r| ConceptRef::parse(r)).collect::<Result<_, _>>()?,
        queries: req.queries.iter().map(|r| QueryRef::parse(r)).collect::<Result<_, _>>()?,
        imports: req.imports.iter().map(|r| ImportRef::parse(r)).collect::<Result<_, _>>()?,
    };

    let (cancel, _guard) = request_token();
    let resources = state.preflight.check(&user, &refs, &cancel).await?;

    let resources_json = serde_json::to_value(&resources).map_err(|e| {
        tracing::error!("Preflight serialisation error: {e}");
        ApiError::Internal
    })?;

    Ok(Json(PreflightRes {
        ok: resources.ok(),
        resources: resources_json,
        errors: resources.errors().iter().map(ToString::to_string).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/federated",
    request_body = SubmitReq,
    responses(
        (status = 202, description = "Submitted to the hub", body = SubmitRes),
        (status = 400, description = "Query cannot be federated"),
        (status = 502, description = "Hub delivery failed"),
        (status = 503, description = "Federation is not configured")
    )
)]
/// Submit a query for federated execution
///
/// Returns as soon as the hub accepts the delivery; poll `/federated/{id}` for the result.
#[axum::debug_handler]
pub async fn submit_federated(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(req): Json<SubmitReq>,
) -> Result<(StatusCode, Json<SubmitRes>), ApiError> {
    let service = federation(&state)?;
    let query = FederatedQuery {
        name: req.name,
        panels: req.panels,
    };

    let (cancel, _guard) = request_token();
    let id = service.submit(&user, &query, &cancel).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitRes {
            correlation_id: id.0,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/federated/{id}",
    params(
        ("id" = i64, Path, description = "Correlation id returned at submission")
    ),
    responses(
        (status = 200, description = "Hub result"),
        (status = 204, description = "No result yet, poll again later"),
        (status = 503, description = "Federation is not configured")
    )
)]
/// Poll for the result of a federated submission
pub async fn poll_federated(
    State(state): State<AppState>,
    Caller(_user): Caller,
    AxumPath(id): AxumPath<i64>,
) -> Result<Response, ApiError> {
    let service = federation(&state)?;

    Ok(match service.poll(CorrelationId(id)).await {
        PollOutcome::Ready(result) => Json(result).into_response(),
        PollOutcome::NotYetAvailable => StatusCode::NO_CONTENT.into_response(),
    })
}

#[utoipa::path(
    post,
    path = "/federated/results",
    responses(
        (status = 202, description = "Result stored", body = SubmitRes),
        (status = 400, description = "Envelope does not carry a valid result"),
        (status = 503, description = "Federation is not configured")
    )
)]
/// Inbound hook for result delivery envelopes sent by the hub
pub async fn accept_federated_result(
    State(state): State<AppState>,
    Json(envelope): Json<DeliveryEnvelope>,
) -> Result<(StatusCode, Json<SubmitRes>), ApiError> {
    let service = federation(&state)?;
    let id = service.accept_delivery(envelope).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitRes {
            correlation_id: id.0,
        }),
    ))
}
