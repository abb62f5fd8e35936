//! Constants used throughout the cohort core crate.

/// Default lifetime of a federated submission record, in seconds.
pub const DEFAULT_SUBMISSION_TTL_SECS: u64 = 60 * 60;

/// Default lifetime of a cached hub result, in seconds.
pub const DEFAULT_RESULT_TTL_SECS: u64 = 60 * 60;

/// Default upper bound on entries held by each federation cache.
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// How many random correlation ids are tried before a submission gives up.
pub const CORRELATION_ID_ATTEMPTS: usize = 5;

/// Longest hub base URL accepted by configuration.
pub const MAX_HUB_URL_LEN: usize = 2048;

/// Path, relative to the hub base URL, that accepts delivery envelopes.
pub const HUB_DELIVERIES_PATH: &str = "deliveries";
