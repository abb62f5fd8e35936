//! # API REST
//!
//! REST API for cohort resolution, preflight checks and federated queries.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, caller identity headers)
//!
//! All behaviour lives in `cohort-core`; handlers here only translate between HTTP and core
//! calls.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;
pub mod handlers;
pub mod identity;

use axum::routing::{get, post};
use axum::Router;
use cohort_core::backend::Backend;
use cohort_core::{CompilerContextProvider, FederationService, PreflightChecker};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared by all request handlers.
///
/// `federation` is `None` on nodes that are not attached to a hub; federated endpoints then
/// answer `503 Service Unavailable`.
#[derive(Clone)]
pub struct AppState {
    pub contexts: CompilerContextProvider,
    pub preflight: PreflightChecker,
    pub federation: Option<FederationService>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, federation: Option<FederationService>) -> Self {
        Self {
            contexts: CompilerContextProvider::new(backend.clone()),
            preflight: PreflightChecker::new(backend),
            federation,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::dataset_context,
        handlers::concept_context,
        handlers::panel_context,
        handlers::demographic_context,
        handlers::preflight,
        handlers::submit_federated,
        handlers::poll_federated,
        handlers::accept_federated_result,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ErrorRes,
        dto::ContextRes,
        dto::PreflightReq,
        dto::PreflightRes,
        dto::SubmitReq,
        dto::SubmitRes,
    ))
)]
pub struct ApiDoc;

/// Build the REST router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/queries/:query/datasets/:dataset",
            get(handlers::dataset_context),
        )
        .route(
            "/queries/:query/concepts/:concept",
            get(handlers::concept_context),
        )
        .route("/queries/:query/panels/:index", get(handlers::panel_context))
        .route(
            "/queries/:query/demographics",
            get(handlers::demographic_context),
        )
        .route("/preflight", post(handlers::preflight))
        .route("/federated", post(handlers::submit_federated))
        .route("/federated/results", post(handlers::accept_federated_result))
        .route("/federated/:id", get(handlers::poll_federated))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{GROUPS_HEADER, ISSUER_HEADER, USER_HEADER};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cohort_core::backend::{Catalog, MemoryBackend};
    use cohort_core::federation::{BrokerError, HubBroker};
    use cohort_core::{CoreConfig, HubConfig};
    use http_body_util::BodyExt;
    use hub::{DeliveryEnvelope, QueryResult, ResultStatus, RunQuery};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const CATALOG: &str = r#"
concepts:
  - id: 6d1c3f0a-0000-4000-8000-000000000001
    rootId: 6d1c3f0a-0000-4000-8000-000000000001
    universalId: urn:cohort:concept:diabetes
    uiDisplayName: Diabetes
  - id: 6d1c3f0a-0000-4000-8000-000000000002
    rootId: 6d1c3f0a-0000-4000-8000-000000000002
    universalId: urn:cohort:concept:hiv
    uiDisplayName: HIV
    access: { groups: [infectious-disease] }
datasets:
  - id: 6d1c3f0a-0000-4000-8000-000000000010
    universalId: urn:cohort:dataset:labs
    shape: observation
    name: Labs
    sqlStatement: SELECT * FROM labs
queries:
  - id: 6d1c3f0a-0000-4000-8000-000000000020
    universalId: urn:cohort:query:mine
    name: Mine
    owner: jdoe@idp
    definition:
      - subPanels:
          - panelItems:
              - resource: { kind: concept, ref: { universalId: "urn:cohort:concept:diabetes" } }
"#;

    struct AcceptingBroker;

    #[async_trait]
    impl HubBroker for AcceptingBroker {
        async fn send_to_hub(&self, _query: &RunQuery) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn backend() -> Arc<dyn Backend> {
        Arc::new(MemoryBackend::new(Catalog::from_yaml_str(CATALOG).unwrap()))
    }

    fn federated_state() -> AppState {
        let hub = HubConfig::new(
            "https://hub.example.org",
            7,
            "Node A",
            12,
            "example.org",
            3,
            "Diabetes",
        )
        .unwrap();
        let config =
            CoreConfig::new(Some(hub), Duration::from_secs(60), Duration::from_secs(60), 100)
                .unwrap();
        let federation = FederationService::new(&config, Arc::new(AcceptingBroker)).unwrap();

        AppState::new(backend(), Some(federation))
    }

    fn get_as(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(USER_HEADER, user)
            .header(ISSUER_HEADER, "idp")
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(USER_HEADER, "jdoe")
            .header(ISSUER_HEADER, "idp")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(AppState::new(backend(), None));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["ok"], true);
    }

    #[tokio::test]
    async fn test_dataset_context_resolves_for_owner() {
        let app = router(AppState::new(backend(), None));

        let response = app
            .oneshot(get_as(
                "/queries/urn:cohort:query:mine/datasets/urn:cohort:dataset:labs?shape=observation",
                "jdoe",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"], json!(["ok"]));
        assert_eq!(body["context"]["dataset"]["name"], "Labs");
    }

    #[tokio::test]
    async fn test_dataset_shape_mismatch_is_bad_request() {
        let app = router(AppState::new(backend(), None));

        let response = app
            .oneshot(get_as(
                "/queries/urn:cohort:query:mine/datasets/urn:cohort:dataset:labs?shape=encounter",
                "jdoe",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["state"], json!(["datasetShapeMismatch"]));
    }

    #[tokio::test]
    async fn test_query_of_other_user_is_not_found() {
        let app = router(AppState::new(backend(), None));

        let response = app
            .oneshot(get_as("/queries/urn:cohort:query:mine/demographics", "asmith"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let state = body_json(response).await["state"].clone();
        assert!(state.as_array().unwrap().contains(&json!("queryNotFound")));
    }

    #[tokio::test]
    async fn test_panel_out_of_range_is_not_found() {
        let app = router(AppState::new(backend(), None));

        let response = app
            .oneshot(get_as("/queries/urn:cohort:query:mine/panels/3", "jdoe"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["state"], json!(["panelNotFound"]));
    }

    #[tokio::test]
    async fn test_malformed_reference_is_bad_request() {
        let app = router(AppState::new(backend(), None));

        let response = app
            .oneshot(get_as("/queries/urn:cohort/demographics", "jdoe"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = router(AppState::new(backend(), None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/queries/urn:cohort:query:mine/demographics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_preflight_reports_unauthorized_concept() {
        let app = router(AppState::new(backend(), None));

        let response = app
            .oneshot(post_json(
                "/preflight",
                json!({ "concepts": ["urn:cohort:concept:diabetes", "urn:cohort:concept:hiv"] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
        assert!(body["errors"][0].as_str().unwrap().contains("urn:cohort:concept:hiv"));
    }

    #[tokio::test]
    async fn test_preflight_passes_for_group_member() {
        let app = router(AppState::new(backend(), None));
        let request = Request::builder()
            .method("POST")
            .uri("/preflight")
            .header(USER_HEADER, "jdoe")
            .header(ISSUER_HEADER, "idp")
            .header(GROUPS_HEADER, "infectious-disease")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "concepts": ["urn:cohort:concept:hiv"] }).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(body_json(response).await["ok"], true);
    }

    #[tokio::test]
    async fn test_federation_disabled_is_service_unavailable() {
        let app = router(AppState::new(backend(), None));

        let response = app.oneshot(get_as("/federated/42", "jdoe")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_submit_then_poll_round_trip() {
        let app = router(federated_state());
        let query = json!({
            "name": "Diabetics",
            "panels": [{
                "subPanels": [{
                    "panelItems": [{
                        "resource": {
                            "kind": "concept",
                            "ref": { "universalId": "urn:cohort:concept:diabetes" }
                        }
                    }]
                }]
            }]
        });

        let response = app.clone().oneshot(post_json("/federated", query)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let id = body_json(response).await["correlationId"].as_i64().unwrap();

        let pending = app
            .clone()
            .oneshot(get_as(&format!("/federated/{id}"), "jdoe"))
            .await
            .unwrap();
        assert_eq!(pending.status(), StatusCode::NO_CONTENT);

        let result = QueryResult {
            query_id: id,
            adapter_node_id: 9,
            adapter_node_name: "Node B".into(),
            status: ResultStatus::Completed,
            count: Some(120),
            obfuscating_parameters: None,
            status_message: None,
        };
        let envelope = serde_json::to_value(DeliveryEnvelope::result(&result).unwrap()).unwrap();
        let delivered = app
            .clone()
            .oneshot(post_json("/federated/results", envelope))
            .await
            .unwrap();
        assert_eq!(delivered.status(), StatusCode::ACCEPTED);

        let ready = app.oneshot(get_as(&format!("/federated/{id}"), "jdoe")).await.unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(body_json(ready).await["count"], 120);
    }

    #[tokio::test]
    async fn test_submit_without_inclusion_panel_is_bad_request() {
        let app = router(federated_state());
        let query = json!({
            "name": "Nobody",
            "panels": [{
                "include": false,
                "subPanels": [{
                    "panelItems": [{
                        "resource": {
                            "kind": "concept",
                            "ref": { "universalId": "urn:cohort:concept:diabetes" }
                        }
                    }]
                }]
            }]
        });

        let response = app.oneshot(post_json("/federated", query)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
