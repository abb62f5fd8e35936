//! Internal implementation of URN parsing and rendering.

use crate::{UrnError, UrnResult};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Namespace identifier shared by every node on the network.
pub const NAMESPACE: &str = "cohort";

const SCHEME: &str = "urn";
const MAX_NSS_LEN: usize = 256;

/// The kind of resource a URN names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UrnKind {
    Query,
    Concept,
    Dataset,
    Import,
}

impl UrnKind {
    /// Returns the lowercase token used in the URN's kind segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            UrnKind::Query => "query",
            UrnKind::Concept => "concept",
            UrnKind::Dataset => "dataset",
            UrnKind::Import => "import",
        }
    }

    /// Parses a kind token. Only the lowercase spelling is accepted.
    pub fn parse(s: &str) -> UrnResult<Self> {
        match s {
            "query" => Ok(UrnKind::Query),
            "concept" => Ok(UrnKind::Concept),
            "dataset" => Ok(UrnKind::Dataset),
            "import" => Ok(UrnKind::Import),
            _ => Err(UrnError::InvalidInput(format!(
                "unknown URN kind '{}' (expected query, concept, dataset or import)",
                s
            ))),
        }
    }
}

impl fmt::Display for UrnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, validated universal resource name.
///
/// Once constructed, a `Urn` is guaranteed to satisfy the grammar described at the crate
/// root, so callers never need to re-validate it before sending it to a backend or to the hub.
///
/// # Construction
/// - [`Urn::parse`] validates an externally supplied string.
/// - [`Urn::new`] validates a kind + namespace-specific string pair.
/// - [`Urn::mint`] allocates a fresh URN with a random UUID body.
///
/// # Display format
/// Always the canonical form: lowercase scheme and namespace, original NSS.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Urn {
    kind: UrnKind,
    nss: String,
}

impl Urn {
    /// Builds a URN from its kind and namespace-specific string.
    ///
    /// # Errors
    ///
    /// Returns [`UrnError::InvalidInput`] if `nss` is empty, too long, or contains a
    /// character outside the allowed set.
    pub fn new(kind: UrnKind, nss: impl Into<String>) -> UrnResult<Self> {
        let nss = nss.into();
        validate_nss(&nss)?;
        Ok(Self { kind, nss })
    }

    /// Allocates a new URN of the given kind whose body is a random UUID.
    ///
    /// Used when a node publishes a locally created resource to the network for the first
    /// time.
    pub fn mint(kind: UrnKind) -> Self {
        Self {
            kind,
            nss: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Parses a URN string.
    ///
    /// # Arguments
    ///
    /// * `input` - Candidate string, for example `urn:cohort:query:3f2a...`.
    ///
    /// # Errors
    ///
    /// Returns [`UrnError::InvalidInput`] if:
    /// - the scheme is not `urn` or the namespace is not `cohort`,
    /// - the kind segment is missing or unknown,
    /// - the namespace-specific string is missing or malformed.
    pub fn parse(input: &str) -> UrnResult<Self> {
        let mut parts = input.splitn(4, ':');

        let scheme = parts.next().unwrap_or_default();
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(UrnError::InvalidInput(format!(
                "URN must start with 'urn:', got: '{}'",
                input
            )));
        }

        let namespace = parts.next().unwrap_or_default();
        if !namespace.eq_ignore_ascii_case(NAMESPACE) {
            return Err(UrnError::InvalidInput(format!(
                "URN namespace must be '{}', got: '{}'",
                NAMESPACE, namespace
            )));
        }

        let kind = match parts.next() {
            Some(kind) => UrnKind::parse(kind)?,
            None => {
                return Err(UrnError::InvalidInput(format!(
                    "URN is missing its kind segment: '{}'",
                    input
                )))
            }
        };

        let nss = parts.next().ok_or_else(|| {
            UrnError::InvalidInput(format!(
                "URN is missing its namespace-specific string: '{}'",
                input
            ))
        })?;

        Self::new(kind, nss)
    }

    /// Returns true if `input` looks like a URN (starts with `urn:`, any case).
    ///
    /// This is a cheap prefix test used to decide which parser a raw reference string goes
    /// to. It does not validate the rest of the string.
    pub fn looks_like_urn(input: &str) -> bool {
        input
            .get(..SCHEME.len() + 1)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"))
    }

    pub fn kind(&self) -> UrnKind {
        self.kind
    }

    /// Returns the namespace-specific string.
    pub fn nss(&self) -> &str {
        &self.nss
    }
}

fn validate_nss(nss: &str) -> UrnResult<()> {
    if nss.is_empty() {
        return Err(UrnError::InvalidInput(
            "URN namespace-specific string cannot be empty".into(),
        ));
    }

    if nss.len() > MAX_NSS_LEN {
        return Err(UrnError::InvalidInput(format!(
            "URN namespace-specific string exceeds maximum length of {} characters",
            MAX_NSS_LEN
        )));
    }

    let ok = nss.bytes().all(|b| {
        matches!(
            b,
            b'0'..=b'9'
                | b'a'..=b'z'
                | b'A'..=b'Z'
                | b'-'
                | b'.'
                | b'_'
                | b'~'
                | b':'
                | b'+'
                | b'%'
                | b'@'
                | b'/'
                | b'='
        )
    });

    if !ok {
        return Err(UrnError::InvalidInput(format!(
            "URN namespace-specific string contains invalid characters: '{}'",
            nss
        )));
    }

    Ok(())
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", SCHEME, NAMESPACE, self.kind, self.nss)
    }
}

impl FromStr for Urn {
    type Err = UrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Urn::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Urn {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Urn {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Urn::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for UrnKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
