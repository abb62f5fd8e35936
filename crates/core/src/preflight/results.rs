//! Per-item preflight verdicts.

use crate::refs::ResourceRef;
use crate::user::SessionType;
use cohort_urn::{Urn, UrnKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptPreflightCheckResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<Urn>,
    pub is_present: bool,
    pub is_authorized: bool,
}

impl ConceptPreflightCheckResult {
    /// A not-present, not-authorized verdict echoing the requested reference.
    pub fn absent(reference: &ResourceRef) -> Self {
        Self {
            id: reference.id,
            universal_id: reference.universal_id.clone(),
            is_present: false,
            is_authorized: false,
        }
    }

    pub fn ok(&self) -> bool {
        self.is_present && self.is_authorized
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            id: self.id,
            universal_id: self.universal_id.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptPreflightCheck {
    pub results: Vec<ConceptPreflightCheckResult>,
}

impl ConceptPreflightCheck {
    pub fn ok(&self) -> bool {
        self.results.iter().all(ConceptPreflightCheckResult::ok)
    }
}

/// Verdict for a saved query, including every concept its definition depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPreflightCheckResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<Urn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    pub is_present: bool,
    pub is_authorized: bool,
    #[serde(default)]
    pub concepts: ConceptPreflightCheck,
}

impl QueryPreflightCheckResult {
    pub fn absent(reference: &ResourceRef) -> Self {
        Self {
            id: reference.id,
            universal_id: reference.universal_id.clone(),
            ..Self::default()
        }
    }

    /// Present, authorized, and so are all of its nested concepts.
    pub fn ok(&self) -> bool {
        self.is_present && self.is_authorized && self.concepts.ok()
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            id: self.id,
            universal_id: self.universal_id.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightQueries {
    pub results: Vec<QueryPreflightCheckResult>,
}

impl PreflightQueries {
    pub fn ok(&self) -> bool {
        self.results.iter().all(QueryPreflightCheckResult::ok)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreflightCheckResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<Urn>,
    pub is_present: bool,
    pub is_authorized: bool,
}

impl ImportPreflightCheckResult {
    pub fn absent(reference: &ResourceRef) -> Self {
        Self {
            id: reference.id,
            universal_id: reference.universal_id.clone(),
            is_present: false,
            is_authorized: false,
        }
    }

    pub fn ok(&self) -> bool {
        self.is_present && self.is_authorized
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            id: self.id,
            universal_id: self.universal_id.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightImports {
    pub results: Vec<ImportPreflightCheckResult>,
}

impl PreflightImports {
    pub fn ok(&self) -> bool {
        self.results.iter().all(ImportPreflightCheckResult::ok)
    }
}

/// A node-wide filter applied to every query, optionally only in one session type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalPanelFilter {
    pub id: i32,
    #[serde(default)]
    pub session_type: Option<SessionType>,
    pub is_inclusion: bool,
    pub sql_set_where: String,
}

/// The full preflight verdict for one bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightResources {
    pub concepts: ConceptPreflightCheck,
    pub queries: PreflightQueries,
    pub imports: PreflightImports,
    pub global_panel_filters: Vec<GlobalPanelFilter>,
}

impl PreflightResources {
    pub fn ok(&self) -> bool {
        self.concepts.ok() && self.queries.ok() && self.imports.ok()
    }

    /// Every failing item, in result order. Nested concepts follow the query they belong to.
    pub fn errors(&self) -> Vec<PreflightFailure> {
        let mut failures = Vec::new();

        for c in self.concepts.results.iter().filter(|c| !c.ok()) {
            failures.push(PreflightFailure::new(
                UrnKind::Concept,
                c.reference(),
                c.is_present,
                None,
            ));
        }

        for q in &self.queries.results {
            if !(q.is_present && q.is_authorized) {
                failures.push(PreflightFailure::new(
                    UrnKind::Query,
                    q.reference(),
                    q.is_present,
                    None,
                ));
            }
            for c in q.concepts.results.iter().filter(|c| !c.ok()) {
                failures.push(PreflightFailure::new(
                    UrnKind::Concept,
                    c.reference(),
                    c.is_present,
                    Some(q.reference()),
                ));
            }
        }

        for i in self.imports.results.iter().filter(|i| !i.ok()) {
            failures.push(PreflightFailure::new(
                UrnKind::Import,
                i.reference(),
                i.is_present,
                None,
            ));
        }

        failures
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    NotPresent,
    NotAuthorized,
}

/// One reference that failed preflight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightFailure {
    pub kind: UrnKind,
    pub reference: ResourceRef,
    pub reason: FailureReason,
    /// The saved query that pulled this concept in, for nested failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_by: Option<ResourceRef>,
}

impl PreflightFailure {
    fn new(
        kind: UrnKind,
        reference: ResourceRef,
        is_present: bool,
        required_by: Option<ResourceRef>,
    ) -> Self {
        let reason = if is_present {
            FailureReason::NotAuthorized
        } else {
            FailureReason::NotPresent
        };
        Self {
            kind,
            reference,
            reason,
            required_by,
        }
    }
}

impl fmt::Display for PreflightFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            FailureReason::NotPresent => "is not present",
            FailureReason::NotAuthorized => "is not authorized",
        };
        write!(f, "{} {} {reason}", self.kind, self.reference)?;
        if let Some(query) = &self.required_by {
            write!(f, " (required by query {query})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(urn: &str, present: bool, authorized: bool) -> ConceptPreflightCheckResult {
        ConceptPreflightCheckResult {
            id: None,
            universal_id: Some(Urn::parse(urn).unwrap()),
            is_present: present,
            is_authorized: authorized,
        }
    }

    #[test]
    fn test_nested_concept_failure_fails_query() {
        let resources = PreflightResources {
            queries: PreflightQueries {
                results: vec![QueryPreflightCheckResult {
                    universal_id: Some(Urn::parse("urn:cohort:query:q1").unwrap()),
                    is_present: true,
                    is_authorized: true,
                    concepts: ConceptPreflightCheck {
                        results: vec![concept("urn:cohort:concept:c3", true, false)],
                    },
                    ..QueryPreflightCheckResult::default()
                }],
            },
            ..PreflightResources::default()
        };

        assert!(!resources.ok());
        let errors = resources.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].reason, FailureReason::NotAuthorized);
        assert_eq!(
            errors[0].to_string(),
            "concept urn:cohort:concept:c3 is not authorized \
             (required by query urn:cohort:query:q1)"
        );
    }

    #[test]
    fn test_empty_resources_are_ok() {
        let resources = PreflightResources::default();

        assert!(resources.ok());
        assert!(resources.errors().is_empty());
    }

    #[test]
    fn test_absent_echoes_reference() {
        let reference = ResourceRef::by_id(Uuid::nil());
        let result = ImportPreflightCheckResult::absent(&reference);

        assert_eq!(result.reference(), reference);
        assert!(!result.ok());
    }
}
