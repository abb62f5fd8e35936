//! Panels: the structural description of a cohort.
//!
//! A query definition is a JSON array of [`Panel`]s. Panels are ANDed together; each panel is
//! an OR over the items of its sub-panels. An exclusion panel (`include = false`) removes its
//! patients from the cohort.

use crate::refs::{ConceptRef, ImportRef, QueryRef};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Inclusive date range applied to a panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateBoundary {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateBoundary {
    /// Builds a boundary only when both bounds are supplied.
    ///
    /// Reversed bounds are swapped so `start <= end` always holds.
    pub fn from_bounds(early: Option<NaiveDate>, late: Option<NaiveDate>) -> Option<Self> {
        match (early, late) {
            (Some(a), Some(b)) if a <= b => Some(Self { start: a, end: b }),
            (Some(a), Some(b)) => Some(Self { start: b, end: a }),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumericFilterType {
    EqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    Between,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericFilter {
    pub filter_type: NumericFilterType,
    pub filter: Vec<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecencyFilter {
    #[default]
    None,
    Min,
    Max,
}

/// What a panel item points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "camelCase")]
pub enum ItemResource {
    Concept(ConceptRef),
    Query(QueryRef),
    Import(ImportRef),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelItem {
    #[serde(default)]
    pub index: i32,
    pub resource: ItemResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_filter: Option<NumericFilter>,
    #[serde(default)]
    pub recency_filter: RecencyFilter,
    /// Chosen specializations, one per group at most.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specializations: Vec<uuid::Uuid>,
}

impl PanelItem {
    pub fn new(resource: ItemResource) -> Self {
        Self {
            index: 0,
            resource,
            numeric_filter: None,
            recency_filter: RecencyFilter::None,
            specializations: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubPanel {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_true")]
    pub include: bool,
    pub panel_items: Vec<PanelItem>,
}

impl SubPanel {
    pub fn new(index: i32, panel_items: Vec<PanelItem>) -> Self {
        Self {
            index,
            include: true,
            panel_items,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_true")]
    pub include: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_filter: Option<DateBoundary>,
    pub sub_panels: Vec<SubPanel>,
}

impl Panel {
    pub fn new(index: i32, include: bool, sub_panels: Vec<SubPanel>) -> Self {
        Self {
            index,
            include,
            date_filter: None,
            sub_panels,
        }
    }

    /// A one-item inclusion panel, as built for concept dataset extraction.
    pub fn single_item(item: PanelItem, date_filter: Option<DateBoundary>) -> Self {
        Self {
            index: 0,
            include: true,
            date_filter,
            sub_panels: vec![SubPanel::new(0, vec![item])],
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &PanelItem> {
        self.sub_panels.iter().flat_map(|sp| sp.panel_items.iter())
    }
}

fn default_true() -> bool {
    true
}

/// Selects a panel from a parsed definition.
///
/// Negative or out-of-range indices yield `None`.
pub fn panel_at(panels: Vec<Panel>, index: i64) -> Option<Panel> {
    let index = usize::try_from(index).ok()?;
    panels.into_iter().nth(index)
}
