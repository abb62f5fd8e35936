//! Federated execution over the network hub.
//!
//! Submission is fire-and-forget: a query is translated, recorded under a fresh correlation
//! id and handed to the broker, and the id is returned without waiting for any node to
//! answer. Results arrive separately (see [`FederationService::accept_result`]) and are
//! polled by correlation id.
//!
//! The submission record is written before the send and removed again if the send fails or
//! is cancelled, so a correlation id returned to a caller always has a live record behind it.

pub mod broker;
mod cache;
pub mod translate;

pub use broker::{BrokerError, HttpHubBroker, HubBroker};
pub use cache::{ResultCache, UserQueryCache};

use crate::config::{CoreConfig, HubConfig};
use crate::constants::CORRELATION_ID_ATTEMPTS;
use crate::model::FederatedQuery;
use crate::user::UserContext;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use hub::{DeliveryEnvelope, QueryResult, RunQuery};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use translate::{build_run_query, translate_expression};

/// Links a submission to the result later delivered for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub i64);

impl CorrelationId {
    /// A random positive id.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(1..=i64::MAX))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who submitted what, kept until the submission TTL lapses.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub correlation_id: CorrelationId,
    pub user: UserContext,
    pub query: FederatedQuery,
    pub submitted_at: DateTime<Utc>,
}

/// Result of polling a correlation id.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Ready(QueryResult),
    /// Nothing has arrived yet. Not an error: poll again later.
    NotYetAvailable,
}

/// Submits queries to the hub and serves their results.
#[derive(Clone)]
pub struct FederationService {
    hub: HubConfig,
    broker: Arc<dyn HubBroker>,
    submissions: UserQueryCache,
    results: ResultCache,
}

impl FederationService {
    /// Create a federation service from the node configuration.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::FederationDisabled` if no hub is configured.
    pub fn new(config: &CoreConfig, broker: Arc<dyn HubBroker>) -> CoreResult<Self> {
        let hub = config.hub().cloned().ok_or(CoreError::FederationDisabled)?;

        Ok(Self {
            hub,
            broker,
            submissions: UserQueryCache::new(config.cache_capacity(), config.submission_ttl()),
            results: ResultCache::new(config.cache_capacity(), config.result_ttl()),
        })
    }

    /// Submit a query for federated execution, returning its correlation id.
    ///
    /// # Errors
    ///
    /// See [`FederationService::submit_with`].
    pub async fn submit(
        &self,
        user: &UserContext,
        query: &FederatedQuery,
        cancel: &CancellationToken,
    ) -> CoreResult<CorrelationId> {
        self.submit_with(user, query, cancel, CorrelationId::random)
            .await
    }

    /// Submit a query, drawing correlation ids from `id_source`.
    ///
    /// An id that is already live is re-drawn, up to a fixed number of attempts.
    ///
    /// # Arguments
    ///
    /// * `user` - The submitting user, recorded with the submission.
    /// * `query` - The query to translate and send.
    /// * `cancel` - Cancels the submission. Nothing is left cached if it fires.
    /// * `id_source` - Produces candidate correlation ids.
    ///
    /// # Errors
    ///
    /// - `CoreError::Translation` if the query cannot be expressed in the hub protocol. Nothing
    ///   is cached or sent.
    /// - `CoreError::CorrelationIdExhausted` if every candidate id collided.
    /// - `CoreError::BrokerSend` if the broker fails. The submission record is removed.
    /// - `CoreError::Cancelled` if `cancel` fires before the broker returns.
    pub async fn submit_with(
        &self,
        user: &UserContext,
        query: &FederatedQuery,
        cancel: &CancellationToken,
        mut id_source: impl FnMut() -> CorrelationId + Send,
    ) -> CoreResult<CorrelationId> {
        let expression = translate_expression(query)?;

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled("federated submit"));
        }

        let mut allocated = None;
        for _attempt in 0..CORRELATION_ID_ATTEMPTS {
            let candidate = id_source();
            let submission = Submission {
                correlation_id: candidate,
                user: user.clone(),
                query: query.clone(),
                submitted_at: Utc::now(),
            };

            if self.submissions.reserve(submission).await {
                allocated = Some(candidate);
                break;
            }
            tracing::debug!(
                correlation_id = candidate.0,
                "correlation id collision, re-rolling"
            );
        }

        let correlation_id =
            allocated.ok_or(CoreError::CorrelationIdExhausted(CORRELATION_ID_ATTEMPTS))?;

        let run_query = build_run_query(
            &self.hub,
            correlation_id.0,
            user,
            &query.name,
            expression,
            Utc::now(),
        );

        let sent = self
            .spawn_send(correlation_id, run_query, cancel.clone())
            .await
            .map_err(|e| {
                tracing::error!(correlation_id = correlation_id.0, "hub send task failed: {e}");
                CoreError::Cancelled("federated submit")
            })?;

        match sent {
            Ok(()) => {
                tracing::info!(
                    correlation_id = correlation_id.0,
                    user = %user.qualified_name(),
                    query = %query.name,
                    "submitted federated query"
                );
                Ok(correlation_id)
            }
            Err(Some(source)) => Err(CoreError::BrokerSend {
                correlation_id: correlation_id.0,
                source,
            }),
            Err(None) => Err(CoreError::Cancelled("federated submit")),
        }
    }

    /// Sends on a detached task that owns the rollback of the submission record.
    ///
    /// The task outlives a dropped caller, so a client that disconnects mid-send (dropping the
    /// submit future and cancelling `cancel`) still gets its record removed.
    fn spawn_send(
        &self,
        correlation_id: CorrelationId,
        run_query: RunQuery,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), Option<BrokerError>>> {
        let broker = Arc::clone(&self.broker);
        let submissions = self.submissions.clone();

        tokio::spawn(async move {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(None),
                result = broker.send_to_hub(&run_query) => result.map_err(Some),
            };

            if let Err(failure) = &sent {
                submissions.remove(correlation_id).await;
                tracing::warn!(
                    correlation_id = correlation_id.0,
                    cancelled = failure.is_none(),
                    "federated submit failed, submission record removed"
                );
            }
            sent
        })
    }

    /// Look up the result for `id`.
    pub async fn poll(&self, id: CorrelationId) -> PollOutcome {
        match self.results.get(id).await {
            Some(result) => PollOutcome::Ready(result),
            None => PollOutcome::NotYetAvailable,
        }
    }

    /// Store a result delivered by the hub so it can be polled.
    ///
    /// Results for ids with no live submission are still stored, but logged.
    pub async fn accept_result(&self, result: QueryResult) {
        let id = CorrelationId(result.query_id);

        if self.submissions.contains(id).await {
            tracing::info!(correlation_id = id.0, status = ?result.status, "accepted hub result");
        } else {
            tracing::warn!(
                correlation_id = id.0,
                "hub result for unknown or expired correlation id"
            );
        }

        self.results.insert(result).await;
    }

    /// Unwrap an inbound delivery envelope and store the result it carries.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Hub` if the envelope does not carry a valid result.
    pub async fn accept_delivery(&self, envelope: DeliveryEnvelope) -> CoreResult<CorrelationId> {
        let result = envelope.into_result()?;
        let id = CorrelationId(result.query_id);
        self.accept_result(result).await;
        Ok(id)
    }

    /// The live submission record for `id`, if any.
    pub async fn submission(&self, id: CorrelationId) -> Option<Arc<Submission>> {
        self.submissions.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::translate::tests::{federated_query, hub_config};
    use async_trait::async_trait;
    use hub::ResultStatus;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBroker {
        sent: Mutex<Vec<RunQuery>>,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl HubBroker for RecordingBroker {
        async fn send_to_hub(&self, query: &RunQuery) -> Result<(), BrokerError> {
            self.sent.lock().push(query.clone());
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(BrokerError::Rejected {
                    status: 502,
                    body: "hub down".into(),
                });
            }
            Ok(())
        }
    }

    fn service(broker: Arc<RecordingBroker>) -> FederationService {
        let config = CoreConfig::new(
            Some(hub_config()),
            Duration::from_secs(60),
            Duration::from_secs(60),
            100,
        )
        .unwrap();
        FederationService::new(&config, broker).unwrap()
    }

    fn user() -> UserContext {
        UserContext::new("jdoe", "idp").unwrap()
    }

    fn ids(seq: Vec<i64>) -> impl FnMut() -> CorrelationId + Send {
        let mut seq = seq.into_iter();
        move || CorrelationId(seq.next().unwrap_or(i64::MAX))
    }

    fn result(id: i64) -> QueryResult {
        QueryResult {
            query_id: id,
            adapter_node_id: 2,
            adapter_node_name: "Node B".into(),
            status: ResultStatus::Completed,
            count: Some(120),
            obfuscating_parameters: None,
            status_message: None,
        }
    }

    #[test]
    fn test_requires_hub_configuration() {
        let result = FederationService::new(
            &CoreConfig::local_only(),
            Arc::new(RecordingBroker::default()),
        );

        assert!(matches!(result, Err(CoreError::FederationDisabled)));
    }

    #[test]
    fn test_random_ids_are_positive() {
        for _ in 0..100 {
            assert!(CorrelationId::random().0 > 0);
        }
    }

    #[tokio::test]
    async fn test_submit_records_and_sends() {
        let broker = Arc::new(RecordingBroker::default());
        let service = service(broker.clone());

        let id = service
            .submit_with(&user(), &federated_query(), &CancellationToken::new(), ids(vec![31]))
            .await
            .unwrap();

        assert_eq!(id, CorrelationId(31));
        let sent = broker.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, 31);
        assert_eq!(sent[0].query_name, "Diabetic adults");
        drop(sent);

        let record = service.submission(id).await.unwrap();
        assert_eq!(record.user.qualified_name(), "jdoe@idp");
        assert_eq!(record.query, federated_query());
    }

    #[tokio::test]
    async fn test_poll_before_and_after_reply() {
        let service = service(Arc::new(RecordingBroker::default()));
        let id = service
            .submit(&user(), &federated_query(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(service.poll(id).await, PollOutcome::NotYetAvailable);

        let reply = result(id.0);
        service.accept_result(reply.clone()).await;

        assert_eq!(service.poll(id).await, PollOutcome::Ready(reply.clone()));
        assert_eq!(service.poll(id).await, PollOutcome::Ready(reply));
    }

    #[tokio::test]
    async fn test_translation_failure_writes_and_sends_nothing() {
        let broker = Arc::new(RecordingBroker::default());
        let service = service(broker.clone());
        let query = FederatedQuery {
            name: "empty".into(),
            panels: Vec::new(),
        };

        let err = service
            .submit_with(&user(), &query, &CancellationToken::new(), ids(vec![8]))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Translation(_)));
        assert!(broker.sent.lock().is_empty());
        assert!(service.submission(CorrelationId(8)).await.is_none());
    }

    #[tokio::test]
    async fn test_collision_rerolls_then_exhausts() {
        let service = service(Arc::new(RecordingBroker::default()));
        let cancel = CancellationToken::new();
        service
            .submit_with(&user(), &federated_query(), &cancel, ids(vec![5]))
            .await
            .unwrap();

        let rerolled = service
            .submit_with(&user(), &federated_query(), &cancel, ids(vec![5, 5, 6]))
            .await
            .unwrap();
        assert_eq!(rerolled, CorrelationId(6));

        let err = service
            .submit_with(&user(), &federated_query(), &cancel, || CorrelationId(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CorrelationIdExhausted(5)));
    }

    #[tokio::test]
    async fn test_broker_failure_removes_submission() {
        let broker = Arc::new(RecordingBroker {
            fail: true,
            ..RecordingBroker::default()
        });
        let service = service(broker);

        let err = service
            .submit_with(&user(), &federated_query(), &CancellationToken::new(), ids(vec![12]))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::BrokerSend { correlation_id: 12, .. }));
        assert!(service.submission(CorrelationId(12)).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_send_removes_submission() {
        let broker = Arc::new(RecordingBroker {
            hang: true,
            ..RecordingBroker::default()
        });
        let service = service(broker.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = service
            .submit_with(&user(), &federated_query(), &cancel, ids(vec![77]))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Cancelled(_)));
        assert_eq!(broker.sent.lock().len(), 1);
        assert!(service.submission(CorrelationId(77)).await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_submit_removes_submission() {
        let broker = Arc::new(RecordingBroker {
            hang: true,
            ..RecordingBroker::default()
        });
        let service = service(broker.clone());

        // Dropping the future mid-send is what a client disconnect looks like to a handler.
        let outcome = tokio::time::timeout(Duration::from_millis(50), async {
            let cancel = CancellationToken::new();
            let _guard = cancel.clone().drop_guard();
            service
                .submit_with(&user(), &federated_query(), &cancel, ids(vec![4242]))
                .await
        })
        .await;
        assert!(outcome.is_err());
        assert_eq!(broker.sent.lock().len(), 1);

        let mut removed = false;
        for _ in 0..50 {
            if service.submission(CorrelationId(4242)).await.is_none() {
                removed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(removed);
    }

    #[tokio::test]
    async fn test_accepts_results_for_unknown_ids() {
        let service = service(Arc::new(RecordingBroker::default()));

        service.accept_result(result(999)).await;

        assert_eq!(service.poll(CorrelationId(999)).await, PollOutcome::Ready(result(999)));
    }

    #[tokio::test]
    async fn test_accept_delivery_unwraps_envelope() {
        let service = service(Arc::new(RecordingBroker::default()));
        let envelope = DeliveryEnvelope::result(&result(4)).unwrap();

        let id = service.accept_delivery(envelope).await.unwrap();

        assert_eq!(id, CorrelationId(4));
        assert!(matches!(service.poll(id).await, PollOutcome::Ready(_)));
    }
}
