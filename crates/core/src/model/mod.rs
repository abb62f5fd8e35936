//! Domain model shared by the resolvers, preflight and federation.
//!
//! These types are what callers receive; backend row shapes live in `backend::rows`.

pub mod concept;
pub mod dataset;
pub mod panel;
pub mod query;

pub use concept::{Concept, ConceptFlags, ConceptSql, Specialization, SpecializationGroup};
pub use dataset::{DatasetQuery, DemographicQuery};
pub use panel::{
    DateBoundary, ItemResource, NumericFilter, NumericFilterType, Panel, PanelItem,
    RecencyFilter, SubPanel,
};
pub use query::{FederatedQuery, QueryContext};
