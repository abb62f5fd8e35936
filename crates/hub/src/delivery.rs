//! Delivery envelope.
//!
//! Everything sent to or received from the hub travels inside a [`DeliveryEnvelope`]. The
//! `contentsSubject` carries the correlation id and `contentsType` discriminates the payload,
//! which is itself serialised JSON text.

use crate::{parse_strict, Hub, HubError, HubResult, QueryResult, RunQuery};
use serde::{Deserialize, Serialize};

/// Discriminator for the payload of a [`DeliveryEnvelope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryContentType {
    RunQueryForResult,
    Result,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeliveryEnvelope {
    pub contents_subject: i64,
    pub contents_type: DeliveryContentType,
    pub contents: String,
}

impl DeliveryEnvelope {
    /// Wraps a run-query for delivery to the hub, keyed by its id.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidJson`] if the query cannot be serialised.
    pub fn run_query(query: &RunQuery) -> HubResult<Self> {
        Ok(Self {
            contents_subject: query.id,
            contents_type: DeliveryContentType::RunQueryForResult,
            contents: Hub::run_query_render(query)?,
        })
    }

    /// Wraps a query result, keyed by the id of the query it answers.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidJson`] if the result cannot be serialised.
    pub fn result(result: &QueryResult) -> HubResult<Self> {
        Ok(Self {
            contents_subject: result.query_id,
            contents_type: DeliveryContentType::Result,
            contents: Hub::query_result_render(result)?,
        })
    }

    /// Unwraps a result envelope.
    ///
    /// # Errors
    ///
    /// - [`HubError::InvalidInput`] if the envelope does not carry a result, or if the
    ///   subject does not match the result's query id.
    /// - [`HubError::Translation`] if the payload does not match the result schema.
    pub fn into_result(self) -> HubResult<QueryResult> {
        if self.contents_type != DeliveryContentType::Result {
            return Err(HubError::InvalidInput(format!(
                "expected a Result delivery, got {:?}",
                self.contents_type
            )));
        }

        let result = Hub::query_result_parse(&self.contents)?;
        if result.query_id != self.contents_subject {
            return Err(HubError::InvalidInput(format!(
                "delivery subject {} does not match result query id {}",
                self.contents_subject, result.query_id
            )));
        }

        Ok(result)
    }
}

impl Hub {
    /// Parse a delivery envelope from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Translation`] if the JSON does not match the envelope schema.
    pub fn delivery_parse(json_text: &str) -> HubResult<DeliveryEnvelope> {
        parse_strict(json_text, "Delivery")
    }
}
