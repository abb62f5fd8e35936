//! Outbound delivery to the network hub.

use crate::config::HubConfig;
use crate::constants::HUB_DELIVERIES_PATH;
use async_trait::async_trait;
use hub::{DeliveryEnvelope, HubError, RunQuery};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("hub rejected delivery with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("failed to encode delivery: {0}")]
    Serialization(#[from] HubError),
}

/// Fire-and-forget delivery of a run-query to the hub.
///
/// The query's id is its correlation id. A successful return means the hub accepted the
/// delivery, not that any node has answered.
#[async_trait]
pub trait HubBroker: Send + Sync {
    async fn send_to_hub(&self, query: &RunQuery) -> Result<(), BrokerError>;
}

/// Posts JSON delivery envelopes to `{hub}/deliveries`.
#[derive(Clone, Debug)]
pub struct HttpHubBroker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpHubBroker {
    pub fn new(hub: &HubConfig) -> Self {
        Self::with_client(reqwest::Client::new(), hub)
    }

    pub fn with_client(client: reqwest::Client, hub: &HubConfig) -> Self {
        Self {
            client,
            endpoint: format!("{}/{HUB_DELIVERIES_PATH}", hub.base_url()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl HubBroker for HttpHubBroker {
    async fn send_to_hub(&self, query: &RunQuery) -> Result<(), BrokerError> {
        let envelope = DeliveryEnvelope::run_query(query)?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            correlation_id = query.id,
            status = status.as_u16(),
            "delivery accepted by hub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::translate::tests::sample_run_query;
    use hub::{DeliveryContentType, Hub};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn hub_config(base_url: &str) -> HubConfig {
        HubConfig::new(base_url, 1, "Node A", 10, "example.org", 20, "Diabetes study").unwrap()
    }

    /// Accepts one connection, captures the request body and answers with `status_line`.
    async fn one_shot_server(
        status_line: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            let body_start = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let headers = String::from_utf8_lossy(&buf[..body_start]).to_lowercase();
            let length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);

            while buf.len() < body_start + length {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "{status_line}\r\ncontent-length: 4\r\nconnection: close\r\n\r\nnope"
            );
            socket.write_all(response.as_bytes()).await.unwrap();

            String::from_utf8(buf[body_start..body_start + length].to_vec()).unwrap()
        });

        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_endpoint_joins_deliveries_path() {
        let broker = HttpHubBroker::new(&hub_config("https://hub.example.org/api/"));

        assert_eq!(broker.endpoint(), "https://hub.example.org/api/deliveries");
    }

    #[tokio::test]
    async fn test_posts_envelope_and_accepts_success() {
        let (url, server) = one_shot_server("HTTP/1.1 202 Accepted").await;
        let broker = HttpHubBroker::new(&hub_config(&url));
        let query = sample_run_query(55);

        broker.send_to_hub(&query).await.unwrap();

        let body = server.await.unwrap();
        let envelope: DeliveryEnvelope = serde_json::from_str(&body).unwrap();
        assert_eq!(envelope.contents_subject, 55);
        assert_eq!(envelope.contents_type, DeliveryContentType::RunQueryForResult);
        assert_eq!(Hub::run_query_parse(&envelope.contents).unwrap(), query);
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let (url, server) = one_shot_server("HTTP/1.1 503 Service Unavailable").await;
        let broker = HttpHubBroker::new(&hub_config(&url));

        let err = broker.send_to_hub(&sample_run_query(1)).await.unwrap_err();
        server.await.unwrap();

        match err {
            BrokerError::Rejected { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "nope");
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }
    }
}
