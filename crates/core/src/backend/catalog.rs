//! YAML resource catalog backing [`super::MemoryBackend`].
//!
//! ```yaml
//! concepts:
//!   - id: 0b6f0c1e-0000-4000-8000-000000000001
//!     rootId: 0b6f0c1e-0000-4000-8000-000000000001
//!     universalId: urn:cohort:concept:diabetes
//!     uiDisplayName: Diabetes
//!     access: { groups: [endocrinology] }
//!     specializationGroups:
//!       - id: 1
//!         uiDefaultText: Any encounter
//!         specializations:
//!           - id: 0b6f0c1e-0000-4000-8000-0000000000a1
//!             uiDisplayText: Inpatient
//! datasets: [...]
//! queries: [...]
//! imports: [...]
//! globalPanelFilters: [...]
//! demographicQuery: { sqlStatement: "SELECT ..." }
//! ```

use crate::backend::rows::ConceptRecord;
use crate::backend::CallParams;
use crate::model::{DatasetQuery, DemographicQuery, Panel};
use crate::preflight::GlobalPanelFilter;
use crate::{CoreError, CoreResult};
use cohort_urn::Urn;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// Who may see a constrained resource. An absent constraint means everyone may.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Access {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Access {
    pub fn permits(&self, params: &CallParams) -> bool {
        self.users.iter().any(|u| *u == params.user)
            || self.groups.iter().any(|g| params.groups.contains(g))
    }
}

fn visible(access: Option<&Access>, params: &CallParams) -> bool {
    params.admin || access.map_or(true, |a| a.permits(params))
}

fn owned_or_shared(owner: &str, shared: bool, params: &CallParams) -> bool {
    params.admin || shared || owner == params.user
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogSpecialization {
    pub id: Uuid,
    #[serde(default)]
    pub universal_id: Option<Urn>,
    pub ui_display_text: String,
    #[serde(default)]
    pub sql_set_where: Option<String>,
    #[serde(default)]
    pub order: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogSpecializationGroup {
    pub id: i32,
    #[serde(default)]
    pub sql_set_from: Option<String>,
    pub ui_default_text: String,
    #[serde(default)]
    pub specializations: Vec<CatalogSpecialization>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConcept {
    #[serde(flatten)]
    pub record: ConceptRecord,
    #[serde(default)]
    pub access: Option<Access>,
    #[serde(default)]
    pub specialization_groups: Vec<CatalogSpecializationGroup>,
}

impl CatalogConcept {
    pub fn visible_to(&self, params: &CallParams) -> bool {
        visible(self.access.as_ref(), params)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDataset {
    #[serde(flatten)]
    pub query: DatasetQuery,
    #[serde(default)]
    pub access: Option<Access>,
}

impl CatalogDataset {
    pub fn visible_to(&self, params: &CallParams) -> bool {
        visible(self.access.as_ref(), params)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogQuery {
    pub id: Uuid,
    #[serde(default)]
    pub universal_id: Option<Urn>,
    pub name: String,
    /// Issuer-qualified owner, `user@issuer`.
    pub owner: String,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub ver: Option<i32>,
    #[serde(default)]
    pub pepper: Option<Uuid>,
    #[serde(default)]
    pub definition: Vec<Panel>,
}

impl CatalogQuery {
    pub fn visible_to(&self, params: &CallParams) -> bool {
        owned_or_shared(&self.owner, self.shared, params)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogImport {
    pub id: Uuid,
    #[serde(default)]
    pub universal_id: Option<Urn>,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub shared: bool,
}

impl CatalogImport {
    pub fn visible_to(&self, params: &CallParams) -> bool {
        owned_or_shared(&self.owner, self.shared, params)
    }
}

/// Every resource a [`super::MemoryBackend`] can serve.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Catalog {
    #[serde(default)]
    pub concepts: Vec<CatalogConcept>,
    #[serde(default)]
    pub datasets: Vec<CatalogDataset>,
    #[serde(default)]
    pub queries: Vec<CatalogQuery>,
    #[serde(default)]
    pub imports: Vec<CatalogImport>,
    #[serde(default)]
    pub global_panel_filters: Vec<GlobalPanelFilter>,
    #[serde(default)]
    pub demographic_query: Option<DemographicQuery>,
}

impl Catalog {
    /// Load a catalog from a YAML file.
    ///
    /// # Errors
    ///
    /// - `CoreError::FileRead` if the file cannot be read.
    /// - `CoreError::YamlDeserialization` if it is not a valid catalog.
    /// - `CoreError::InvalidInput` if it fails [`Catalog::validate`].
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(CoreError::FileRead)?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a catalog from YAML text.
    pub fn from_yaml_str(text: &str) -> CoreResult<Self> {
        let catalog: Catalog =
            serde_yaml::from_str(text).map_err(CoreError::YamlDeserialization)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Checks that ids and universal ids are unique within each resource kind.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` naming the first duplicate.
    pub fn validate(&self) -> CoreResult<()> {
        fn unique<'a>(
            kind: &str,
            entries: impl Iterator<Item = (&'a Uuid, Option<&'a Urn>)>,
        ) -> CoreResult<()> {
            let mut ids = HashSet::new();
            let mut urns = HashSet::new();
            for (id, urn) in entries {
                if !ids.insert(id) {
                    return Err(CoreError::InvalidInput(format!(
                        "duplicate {kind} id {id} in catalog"
                    )));
                }
                if let Some(urn) = urn {
                    if !urns.insert(urn) {
                        return Err(CoreError::InvalidInput(format!(
                            "duplicate {kind} universal id {urn} in catalog"
                        )));
                    }
                }
            }
            Ok(())
        }

        unique(
            "concept",
            self.concepts
                .iter()
                .map(|c| (&c.record.id, c.record.universal_id.as_ref())),
        )?;
        unique(
            "dataset",
            self.datasets
                .iter()
                .map(|d| (&d.query.id, d.query.universal_id.as_ref())),
        )?;
        unique(
            "query",
            self.queries.iter().map(|q| (&q.id, q.universal_id.as_ref())),
        )?;
        unique(
            "import",
            self.imports.iter().map(|i| (&i.id, i.universal_id.as_ref())),
        )?;

        let mut group_ids = HashSet::new();
        for group in self.concepts.iter().flat_map(|c| &c.specialization_groups) {
            if !group_ids.insert(group.id) {
                return Err(CoreError::InvalidInput(format!(
                    "duplicate specialization group id {} in catalog",
                    group.id
                )));
            }
        }

        Ok(())
    }
}
