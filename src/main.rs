use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use cohort_core::backend::{Catalog, MemoryBackend};
use cohort_core::config::{HubEnvValues, hub_config_from_env_values, ttl_from_env_value};
use cohort_core::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_RESULT_TTL_SECS, DEFAULT_SUBMISSION_TTL_SECS,
};
use cohort_core::federation::HttpHubBroker;
use cohort_core::{CoreConfig, FederationService};

/// Main entry point for the cohort node
///
/// Resolves configuration once, builds the services and serves the REST API with
/// OpenAPI/Swagger documentation.
///
/// # Environment Variables
/// - `COHORT_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `COHORT_CATALOG`: YAML catalog served by the in-memory backend (default: empty catalog)
/// - `COHORT_SUBMISSION_TTL_SECS`, `COHORT_RESULT_TTL_SECS`: federation cache lifetimes
/// - `COHORT_HUB_URL`: hub base URL; federation is disabled when unset
/// - `COHORT_HUB_NODE_ID`, `COHORT_HUB_NODE_NAME`, `COHORT_HUB_RESEARCHER_ID`,
///   `COHORT_HUB_DOMAIN`, `COHORT_HUB_TOPIC_ID`, `COHORT_HUB_TOPIC_NAME`: required with a hub URL
///
/// # Errors
/// Returns an error if configuration is invalid, the catalog cannot be loaded, or the server
/// cannot bind or fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cohort=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("cohort_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("COHORT_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let catalog = match std::env::var("COHORT_CATALOG").ok().map(PathBuf::from) {
        Some(path) => {
            tracing::info!("++ Loading catalog from {}", path.display());
            Catalog::load(&path)?
        }
        None => {
            tracing::warn!("COHORT_CATALOG not set, serving an empty catalog");
            Catalog::default()
        }
    };

    let hub = hub_config_from_env_values(HubEnvValues {
        url: std::env::var("COHORT_HUB_URL").ok(),
        node_id: std::env::var("COHORT_HUB_NODE_ID").ok(),
        node_name: std::env::var("COHORT_HUB_NODE_NAME").ok(),
        researcher_id: std::env::var("COHORT_HUB_RESEARCHER_ID").ok(),
        user_domain: std::env::var("COHORT_HUB_DOMAIN").ok(),
        topic_id: std::env::var("COHORT_HUB_TOPIC_ID").ok(),
        topic_name: std::env::var("COHORT_HUB_TOPIC_NAME").ok(),
    })?;

    let cfg = Arc::new(CoreConfig::new(
        hub,
        ttl_from_env_value(
            std::env::var("COHORT_SUBMISSION_TTL_SECS").ok(),
            DEFAULT_SUBMISSION_TTL_SECS,
        )?,
        ttl_from_env_value(
            std::env::var("COHORT_RESULT_TTL_SECS").ok(),
            DEFAULT_RESULT_TTL_SECS,
        )?,
        DEFAULT_CACHE_CAPACITY,
    )?);

    let federation = match cfg.hub() {
        Some(hub) => {
            tracing::info!("++ Federating through hub {}", hub.base_url());
            Some(FederationService::new(&cfg, Arc::new(HttpHubBroker::new(hub)))?)
        }
        None => {
            tracing::info!("No hub configured, federation disabled");
            None
        }
    };

    let state = AppState::new(Arc::new(MemoryBackend::new(catalog)), federation);
    let app = api_rest::router(state);

    tracing::info!("++ Starting cohort REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
