//! Dual-addressed resource references.
//!
//! A resource may be addressed by its local opaque id (a UUID minted by this node) or by its
//! network-wide [`Urn`]. A [`ResourceRef`] can carry either or both; which one is consulted for
//! a lookup is decided by [`crate::resolver::resolve`], never by the caller.
//!
//! Typed references ([`QueryRef`], [`ConceptRef`], [`ImportRef`], [`DatasetRef`]) additionally
//! guarantee that a carried URN names the right kind of resource.

use crate::model::panel::{ItemResource, Panel};
use crate::resolver::{self, AddressingMode};
use crate::{CoreError, CoreResult};
use cohort_types::Shape;
use cohort_urn::{Urn, UrnKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A reference to a resource by local id, universal id, or both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<Urn>,
}

impl ResourceRef {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            universal_id: None,
        }
    }

    pub fn by_urn(urn: Urn) -> Self {
        Self {
            id: None,
            universal_id: Some(urn),
        }
    }

    /// Parses a raw reference string.
    ///
    /// A string starting with `urn:` (any case) is parsed as a URN; anything else must be a
    /// UUID local id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MalformedReference` if the string is neither a valid URN nor a UUID.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();

        if Urn::looks_like_urn(trimmed) {
            return Urn::parse(trimmed)
                .map(Self::by_urn)
                .map_err(|e| malformed(raw, e.to_string()));
        }

        Uuid::parse_str(trimmed)
            .map(Self::by_id)
            .map_err(|e| malformed(raw, format!("not a URN or local id: {e}")))
    }

    /// The addressing mode a lookup of this reference will use.
    pub fn mode(&self) -> AddressingMode {
        resolver::resolve(self)
    }

    /// True if the reference matches a backend row carrying `id` and `universal_id`, under
    /// this reference's addressing mode.
    pub fn matches(&self, id: Option<&Uuid>, universal_id: Option<&Urn>) -> bool {
        match self.mode() {
            AddressingMode::ByUniversalId => {
                self.universal_id.is_some() && self.universal_id.as_ref() == universal_id
            }
            AddressingMode::ById => self.id.is_some() && self.id.as_ref() == id,
        }
    }

    fn ensure_kind(self, expected: UrnKind) -> CoreResult<Self> {
        match &self.universal_id {
            Some(urn) if urn.kind() != expected => Err(malformed(
                &urn.to_string(),
                format!("expected a {expected} URN, got a {} URN", urn.kind()),
            )),
            _ => Ok(self),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.universal_id, &self.id) {
            (Some(urn), _) => write!(f, "{urn}"),
            (None, Some(id)) => write!(f, "{id}"),
            (None, None) => f.write_str("<empty reference>"),
        }
    }
}

fn malformed(raw: &str, reason: String) -> CoreError {
    CoreError::MalformedReference {
        raw: raw.to_string(),
        reason,
    }
}

macro_rules! typed_ref {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "ResourceRef", into = "ResourceRef")]
        pub struct $name(ResourceRef);

        impl $name {
            /// Parses a raw reference string, rejecting URNs of another kind.
            ///
            /// # Errors
            ///
            /// Returns `CoreError::MalformedReference` if the string is not a URN or UUID, or
            /// if it is a URN of the wrong kind.
            pub fn parse(raw: &str) -> CoreResult<Self> {
                Self::try_from(ResourceRef::parse(raw)?)
            }

            pub fn by_id(id: Uuid) -> Self {
                Self(ResourceRef::by_id(id))
            }

            pub fn reference(&self) -> &ResourceRef {
                &self.0
            }

            pub fn into_inner(self) -> ResourceRef {
                self.0
            }

            pub fn mode(&self) -> AddressingMode {
                self.0.mode()
            }
        }

        impl TryFrom<ResourceRef> for $name {
            type Error = CoreError;

            fn try_from(value: ResourceRef) -> Result<Self, Self::Error> {
                value.ensure_kind($kind).map(Self)
            }
        }

        impl From<$name> for ResourceRef {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

typed_ref!(
    /// Reference to a saved query.
    QueryRef,
    UrnKind::Query
);
typed_ref!(
    /// Reference to a concept.
    ConceptRef,
    UrnKind::Concept
);
typed_ref!(
    /// Reference to an import (an externally loaded patient list).
    ImportRef,
    UrnKind::Import
);

/// Reference to a dataset plus the shape the caller expects it to have.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "DatasetRefWire")]
pub struct DatasetRef {
    #[serde(flatten)]
    reference: ResourceRef,
    pub shape: Shape,
}

#[derive(Deserialize)]
struct DatasetRefWire {
    #[serde(flatten)]
    reference: ResourceRef,
    shape: Shape,
}

impl TryFrom<DatasetRefWire> for DatasetRef {
    type Error = CoreError;

    fn try_from(value: DatasetRefWire) -> Result<Self, Self::Error> {
        Self::new(value.reference, value.shape)
    }
}

impl DatasetRef {
    /// # Errors
    ///
    /// Returns `CoreError::MalformedReference` if the reference carries a non-dataset URN.
    pub fn new(reference: ResourceRef, shape: Shape) -> CoreResult<Self> {
        Ok(Self {
            reference: reference.ensure_kind(UrnKind::Dataset)?,
            shape,
        })
    }

    /// Parses a raw reference string and pairs it with the expected shape.
    pub fn parse(raw: &str, shape: Shape) -> CoreResult<Self> {
        Self::new(ResourceRef::parse(raw)?, shape)
    }

    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    pub fn mode(&self) -> AddressingMode {
        self.reference.mode()
    }
}

/// A bundle of references submitted for preflight.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRefs {
    #[serde(default)]
    pub concepts: Vec<ConceptRef>,
    #[serde(default)]
    pub queries: Vec<QueryRef>,
    #[serde(default)]
    pub imports: Vec<ImportRef>,
}

impl ResourceRefs {
    /// Collects every concept, saved query and import referenced by the panels' items, in
    /// first-seen order and without duplicates.
    pub fn from_panels(panels: &[Panel]) -> Self {
        let mut refs = Self::default();

        let items = panels
            .iter()
            .flat_map(|p| p.sub_panels.iter())
            .flat_map(|sp| sp.panel_items.iter());

        for item in items {
            match &item.resource {
                ItemResource::Concept(r) => refs.concepts.push(r.clone()),
                ItemResource::Query(r) => refs.queries.push(r.clone()),
                ItemResource::Import(r) => refs.imports.push(r.clone()),
            }
        }

        refs.deduplicated()
    }

    /// Returns a copy with repeated references removed, keeping the first occurrence.
    pub fn deduplicated(mut self) -> Self {
        dedup_in_order(&mut self.concepts);
        dedup_in_order(&mut self.queries);
        dedup_in_order(&mut self.imports);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.queries.is_empty() && self.imports.is_empty()
    }
}

fn dedup_in_order<T: Clone + Ord>(items: &mut Vec<T>) {
    let mut seen = std::collections::BTreeSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
