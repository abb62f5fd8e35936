use crate::backend::BackendError;
use crate::federation::broker::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("malformed reference '{raw}': {reason}")]
    MalformedReference { raw: String, reason: String },
    #[error("URN error: {0}")]
    Urn(#[from] cohort_urn::UrnError),

    #[error("backend call {procedure} failed while resolving {subject}: {source}")]
    Backend {
        procedure: &'static str,
        subject: String,
        #[source]
        source: BackendError,
    },
    #[error("failed to decode row set {row_set} of {procedure}: {source}")]
    RowDecode {
        procedure: &'static str,
        row_set: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("{procedure} returned {found} row sets, expected at least {expected}")]
    MissingRowSet {
        procedure: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("failed to parse stored definition of query {query}: {source}")]
    DefinitionParse {
        query: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("operation cancelled during {0}")]
    Cancelled(&'static str),

    #[error("query cannot be federated: {0}")]
    Translation(String),
    #[error("hub protocol error: {0}")]
    Hub(#[from] hub::HubError),
    #[error("failed to send query {correlation_id} to hub: {source}")]
    BrokerSend {
        correlation_id: i64,
        #[source]
        source: BrokerError,
    },
    #[error("failed to allocate a unique correlation id after {0} attempts")]
    CorrelationIdExhausted(usize),
    #[error("federation is not configured on this node")]
    FederationDisabled,

    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
