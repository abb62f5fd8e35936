//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.
//!
//! The `*_from_env_value(s)` helpers take already-read `Option<String>` values; binaries do the
//! actual `std::env::var` calls.

use crate::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_RESULT_TTL_SECS, DEFAULT_SUBMISSION_TTL_SECS,
};
use crate::validation::validate_hub_url;
use crate::{CoreError, CoreResult};
use std::time::Duration;

/// Static identity this node presents to the network hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    base_url: String,
    node_id: i64,
    node_name: String,
    researcher_id: i64,
    user_domain: String,
    topic_id: i64,
    topic_name: String,
}

impl HubConfig {
    /// Create a new `HubConfig`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if the base URL fails [`validate_hub_url`] or any of
    /// the names is blank.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: impl Into<String>,
        node_id: i64,
        node_name: impl Into<String>,
        researcher_id: i64,
        user_domain: impl Into<String>,
        topic_id: i64,
        topic_name: impl Into<String>,
    ) -> CoreResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        validate_hub_url(&base_url)?;

        let node_name = non_blank("node name", node_name.into())?;
        let user_domain = non_blank("user domain", user_domain.into())?;
        let topic_name = non_blank("topic name", topic_name.into())?;

        Ok(Self {
            base_url,
            node_id,
            node_name,
            researcher_id,
            user_domain,
            topic_id,
            topic_name,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn researcher_id(&self) -> i64 {
        self.researcher_id
    }

    pub fn user_domain(&self) -> &str {
        &self.user_domain
    }

    pub fn topic_id(&self) -> i64 {
        self.topic_id
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }
}

fn non_blank(what: &str, value: String) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(format!("hub {what} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    hub: Option<HubConfig>,
    submission_ttl: Duration,
    result_ttl: Duration,
    cache_capacity: u64,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// Federation is enabled iff `hub` is present.
    pub fn new(
        hub: Option<HubConfig>,
        submission_ttl: Duration,
        result_ttl: Duration,
        cache_capacity: u64,
    ) -> CoreResult<Self> {
        if submission_ttl.is_zero() || result_ttl.is_zero() {
            return Err(CoreError::InvalidInput(
                "cache TTLs must be greater than zero".into(),
            ));
        }
        if cache_capacity == 0 {
            return Err(CoreError::InvalidInput(
                "cache capacity must be greater than zero".into(),
            ));
        }

        Ok(Self {
            hub,
            submission_ttl,
            result_ttl,
            cache_capacity,
        })
    }

    /// Configuration for a node that does not federate.
    pub fn local_only() -> Self {
        Self {
            hub: None,
            submission_ttl: Duration::from_secs(DEFAULT_SUBMISSION_TTL_SECS),
            result_ttl: Duration::from_secs(DEFAULT_RESULT_TTL_SECS),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn hub(&self) -> Option<&HubConfig> {
        self.hub.as_ref()
    }

    pub fn submission_ttl(&self) -> Duration {
        self.submission_ttl
    }

    pub fn result_ttl(&self) -> Duration {
        self.result_ttl
    }

    pub fn cache_capacity(&self) -> u64 {
        self.cache_capacity
    }
}

/// Parse a TTL in whole seconds from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `default_secs`.
pub fn ttl_from_env_value(value: Option<String>, default_secs: u64) -> CoreResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let secs = match value {
        Some(v) => v
            .parse::<u64>()
            .map_err(|e| CoreError::InvalidInput(format!("invalid TTL '{v}': {e}")))?,
        None => default_secs,
    };

    if secs == 0 {
        return Err(CoreError::InvalidInput("TTL must be greater than zero".into()));
    }

    Ok(Duration::from_secs(secs))
}

/// Raw hub settings as read from the environment.
#[derive(Clone, Debug, Default)]
pub struct HubEnvValues {
    pub url: Option<String>,
    pub node_id: Option<String>,
    pub node_name: Option<String>,
    pub researcher_id: Option<String>,
    pub user_domain: Option<String>,
    pub topic_id: Option<String>,
    pub topic_name: Option<String>,
}

/// Build the optional hub configuration from raw environment values.
///
/// Returns `Ok(None)` when no hub URL is set. Once a URL is set every other value is required.
///
/// # Errors
///
/// Returns `CoreError::InvalidInput` naming the first missing or unparseable value.
pub fn hub_config_from_env_values(values: HubEnvValues) -> CoreResult<Option<HubConfig>> {
    let Some(url) = values.url.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };

    fn required(name: &str, value: Option<String>) -> CoreResult<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CoreError::InvalidInput(format!("{name} is required when a hub URL is set"))
            })
    }

    fn required_id(name: &str, value: Option<String>) -> CoreResult<i64> {
        let raw = required(name, value)?;
        raw.parse::<i64>()
            .map_err(|e| CoreError::InvalidInput(format!("invalid {name} '{raw}': {e}")))
    }

    let node_id = required_id("COHORT_HUB_NODE_ID", values.node_id)?;
    let node_name = required("COHORT_HUB_NODE_NAME", values.node_name)?;
    let researcher_id = required_id("COHORT_HUB_RESEARCHER_ID", values.researcher_id)?;
    let user_domain = required("COHORT_HUB_DOMAIN", values.user_domain)?;
    let topic_id = required_id("COHORT_HUB_TOPIC_ID", values.topic_id)?;
    let topic_name = required("COHORT_HUB_TOPIC_NAME", values.topic_name)?;

    HubConfig::new(
        url.trim(),
        node_id,
        node_name,
        researcher_id,
        user_domain,
        topic_id,
        topic_name,
    )
    .map(Some)
}
