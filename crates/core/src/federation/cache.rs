//! Concurrent, TTL-bounded caches keyed by correlation id.
//!
//! Each operation touches exactly one key; there is no cross-entry locking.

use super::{CorrelationId, Submission};
use hub::QueryResult;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Outstanding submissions, so a correlation id can be tied back to its user and query.
#[derive(Clone)]
pub struct UserQueryCache {
    inner: Cache<i64, Arc<Submission>>,
}

impl UserQueryCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Stores `submission` unless its correlation id is already live.
    ///
    /// Returns `false` on collision, leaving the existing entry untouched. The check and the
    /// insert are a single atomic step.
    pub async fn reserve(&self, submission: Submission) -> bool {
        let key = submission.correlation_id.0;
        self.inner
            .entry(key)
            .or_insert_with(async move { Arc::new(submission) })
            .await
            .is_fresh()
    }

    pub async fn get(&self, id: CorrelationId) -> Option<Arc<Submission>> {
        self.inner.get(&id.0).await
    }

    pub async fn remove(&self, id: CorrelationId) -> Option<Arc<Submission>> {
        self.inner.remove(&id.0).await
    }

    pub async fn contains(&self, id: CorrelationId) -> bool {
        self.inner.contains_key(&id.0)
    }
}

/// Results delivered back from the hub, waiting to be polled.
#[derive(Clone)]
pub struct ResultCache {
    inner: Cache<i64, QueryResult>,
}

impl ResultCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Stores a result under its query id. A later result for the same id replaces it.
    pub async fn insert(&self, result: QueryResult) {
        self.inner.insert(result.query_id, result).await;
    }

    pub async fn get(&self, id: CorrelationId) -> Option<QueryResult> {
        self.inner.get(&id.0).await
    }
}
