//! Hub-protocol wire/boundary support.
//!
//! This crate provides the **wire models** exchanged with the network hub and strict
//! parse/render helpers for them:
//! - run-query requests (`RunQuery` and its `Expression` tree)
//! - query results returned by adapter nodes (`QueryResult`)
//! - the delivery envelope that carries either of the above (`DeliveryEnvelope`)
//!
//! This crate focuses on:
//! - the exact JSON shape the hub expects (camelCase, `encodedClass` tags)
//! - strict deserialisation (`deny_unknown_fields`) with field-path error messages
//! - version stamping of every versioned item
//!
//! It knows nothing about local panels, concepts or users; translating a local query into a
//! [`RunQuery`] is the job of the caller.

pub mod delivery;
pub mod query;
pub mod result;

pub use delivery::{DeliveryContentType, DeliveryEnvelope};
pub use query::{
    Expression, QueryDefinition, QueryStatus, Researcher, ResultOutputType, RunQuery, Topic,
    VersionInfo,
};
pub use result::{ObfuscatingParameters, QueryResult, ResultStatus};

use serde::de::DeserializeOwned;

/// Version of the hub protocol spoken by this node.
pub const PROTOCOL_VERSION: u32 = 2;

/// Errors returned by the `hub` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Type alias for Results that can fail with a [`HubError`].
pub type HubResult<T> = Result<T, HubError>;

/// Namespace for hub parse/render operations.
///
/// This is a zero-sized type; all methods are associated functions spread across the
/// modules that own the corresponding wire types.
pub struct Hub;

/// Deserialises `text` into `T`, reporting the JSON path of the first failing field.
pub(crate) fn parse_strict<T: DeserializeOwned>(text: &str, what: &str) -> HubResult<T> {
    let mut deserializer = serde_json::Deserializer::from_str(text);

    match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
        Ok(parsed) => {
            deserializer.end()?;
            Ok(parsed)
        }
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            Err(HubError::Translation(format!(
                "{what} schema mismatch at {path}: {source}"
            )))
        }
    }
}
