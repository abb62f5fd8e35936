//! Universal resource names.
//!
//! Resources that travel between institutional nodes (saved queries, concepts, datasets and
//! imports) carry a network-wide identifier in addition to their local opaque id. This crate
//! owns the grammar for that identifier so every other crate can treat a constructed [`Urn`]
//! as already valid.
//!
//! ## Grammar
//! `urn:cohort:<kind>:<nss>`
//!
//! - `urn` and `cohort` are case-insensitive and always rendered lowercase.
//! - `<kind>` is one of `query`, `concept`, `dataset`, `import` (lowercase only).
//! - `<nss>` is 1 to 256 characters from `A-Z a-z 0-9 - . _ ~ : + % @ / =`.
//!
//! Example: `urn:cohort:concept:diabetes:icd10:e11`
//!
//! Notes:
//! - Malformed input is rejected by [`Urn::parse`]; there is no lenient mode.
//! - The NSS is case-sensitive and compared byte-for-byte.

mod service;

pub use service::{Urn, UrnKind, NAMESPACE};

/// Error type for URN operations.
#[derive(Debug, thiserror::Error)]
pub enum UrnError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for URN operations.
pub type UrnResult<T> = Result<T, UrnError>;
