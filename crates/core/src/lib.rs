//! # Cohort Core
//!
//! Resource resolution, preflight authorization and federated execution for cohort queries.
//!
//! This crate contains:
//! - Dual addressing of queries, concepts, datasets and imports by local id or URN
//! - Compiler context providers for dataset, concept, panel and demographic extraction
//! - Preflight checks of presence and authorization, including concepts nested in saved queries
//! - Submission of queries to the network hub and polling of their results
//!
//! **No API concerns**: HTTP servers and request parsing belong in `api-rest`. Data access is
//! behind the [`backend::Backend`] trait; [`backend::MemoryBackend`] serves a YAML catalog.
//!
//! Caller identity is always an explicit [`UserContext`] argument, never ambient state.

pub mod backend;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod error;
pub mod federation;
pub mod hydrate;
pub mod model;
pub mod preflight;
pub mod refs;
pub mod resolver;
pub mod user;
pub mod validation;

pub use compiler::{
    CompilerContextProvider, ConceptDatasetContext, ContextState, DatasetContext, DateBounds,
    DemographicContext, PanelContext, Resolved,
};
pub use config::{CoreConfig, HubConfig};
pub use error::{CoreError, CoreResult};
pub use federation::{CorrelationId, FederationService, PollOutcome};
pub use preflight::{PreflightChecker, PreflightResources};
pub use refs::{ConceptRef, DatasetRef, ImportRef, QueryRef, ResourceRef, ResourceRefs};
pub use resolver::AddressingMode;
pub use user::{SessionType, UserContext};
