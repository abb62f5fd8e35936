//! Context state classification.
//!
//! The state is the only signal callers use to pick an outcome (not found, bad request, or
//! proceed), so it is computed by the provider before a context is handed back.

use bitflags::bitflags;
use cohort_types::Shape;

bitflags! {
    /// Outcome of resolving a compiler context. The empty set means `Ok`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContextState: u8 {
        const QUERY_NOT_FOUND = 1;
        const DATASET_NOT_FOUND = 1 << 1;
        const DATASET_SHAPE_MISMATCH = 1 << 2;
        const PANEL_NOT_FOUND = 1 << 3;
    }
}

impl ContextState {
    pub const OK: ContextState = ContextState::empty();

    pub fn is_ok(&self) -> bool {
        self.is_empty()
    }

    /// True if any not-found flag is set.
    pub fn is_not_found(&self) -> bool {
        self.intersects(
            ContextState::QUERY_NOT_FOUND
                | ContextState::DATASET_NOT_FOUND
                | ContextState::PANEL_NOT_FOUND,
        )
    }

    /// Classifies a dataset context.
    ///
    /// Missing query and missing dataset combine; shape is only compared once both were
    /// found, and a mismatch is reported on its own.
    pub fn for_dataset(query_found: bool, resolved: Option<Shape>, requested: Shape) -> Self {
        let mut state = Self::for_target(query_found, resolved.is_some(), Self::DATASET_NOT_FOUND);
        if !state.is_empty() {
            return state;
        }

        if resolved != Some(requested) {
            state = Self::DATASET_SHAPE_MISMATCH;
        }
        state
    }

    /// Classifies a context whose secondary target has no shape.
    pub fn for_target(query_found: bool, target_found: bool, missing: ContextState) -> Self {
        let mut state = Self::OK;
        if !query_found {
            state |= Self::QUERY_NOT_FOUND;
        }
        if !target_found {
            state |= missing;
        }
        state
    }

    /// camelCase labels of the set flags, or `["ok"]`.
    pub fn labels(&self) -> Vec<&'static str> {
        if self.is_ok() {
            return vec!["ok"];
        }

        [
            (Self::QUERY_NOT_FOUND, "queryNotFound"),
            (Self::DATASET_NOT_FOUND, "datasetNotFound"),
            (Self::DATASET_SHAPE_MISMATCH, "datasetShapeMismatch"),
            (Self::PANEL_NOT_FOUND, "panelNotFound"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, label)| label)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_when_everything_matches() {
        let state = ContextState::for_dataset(true, Some(Shape::Observation), Shape::Observation);

        assert!(state.is_ok());
        assert_eq!(state.labels(), vec!["ok"]);
    }

    #[test]
    fn test_shape_mismatch_is_exclusive() {
        let state = ContextState::for_dataset(true, Some(Shape::Encounter), Shape::Observation);

        assert_eq!(state, ContextState::DATASET_SHAPE_MISMATCH);
        assert!(!state.is_not_found());
    }

    #[test]
    fn test_not_found_flags_combine() {
        let state = ContextState::for_dataset(false, None, Shape::Observation);

        assert_eq!(
            state,
            ContextState::QUERY_NOT_FOUND | ContextState::DATASET_NOT_FOUND
        );
        assert_eq!(state.labels(), vec!["queryNotFound", "datasetNotFound"]);
    }

    #[test]
    fn test_shape_not_checked_when_query_missing() {
        let state = ContextState::for_dataset(false, Some(Shape::Encounter), Shape::Observation);

        assert_eq!(state, ContextState::QUERY_NOT_FOUND);
    }

    #[test]
    fn test_for_target_uses_given_flag() {
        let state = ContextState::for_target(true, false, ContextState::PANEL_NOT_FOUND);

        assert_eq!(state, ContextState::PANEL_NOT_FOUND);
        assert!(state.is_not_found());
    }
}
