//! Local query model to hub wire model.
//!
//! Panels are ANDed together and each panel is an OR over its items. An exclusion panel is
//! wrapped in `Not`. Only concepts with a universal id mean anything to other nodes, so any
//! other item is a translation failure. The hub expression has no place for date or recency
//! filters, specializations, nested sub-panels or excluded sub-panels, so a panel using any of
//! them is rejected rather than silently widened.

use crate::config::HubConfig;
use crate::model::{
    FederatedQuery, ItemResource, NumericFilter, NumericFilterType, Panel, PanelItem,
    RecencyFilter,
};
use crate::user::UserContext;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use hub::{
    Expression, QueryDefinition, QueryStatus, Researcher, ResultOutputType, RunQuery, Topic,
    VersionInfo,
};

/// Translates a query's panels into a hub expression tree.
///
/// # Errors
///
/// Returns `CoreError::Translation` if the query has no name, has no inclusion panel,
/// contains an empty panel, references anything other than a concept with a URN, or uses a
/// panel feature the hub expression cannot carry.
pub fn translate_expression(query: &FederatedQuery) -> CoreResult<Expression> {
    if query.name.trim().is_empty() {
        return Err(CoreError::Translation("query name cannot be empty".into()));
    }
    if !query.panels.iter().any(|p| p.include) {
        return Err(CoreError::Translation(
            "query needs at least one inclusion panel".into(),
        ));
    }

    let panels = query
        .panels
        .iter()
        .map(translate_panel)
        .collect::<CoreResult<Vec<_>>>()?;

    Ok(Expression::all(panels))
}

fn translate_panel(panel: &Panel) -> CoreResult<Expression> {
    let untranslatable = |what: &str| {
        CoreError::Translation(format!("panel {} {what} cannot be federated", panel.index))
    };

    if panel.date_filter.is_some() {
        return Err(untranslatable("date filter"));
    }
    let sub_panel = match panel.sub_panels.as_slice() {
        [] => return Err(CoreError::Translation(format!("panel {} has no items", panel.index))),
        [only] => only,
        _ => return Err(untranslatable("with more than one sub-panel")),
    };
    if !sub_panel.include {
        return Err(untranslatable("exclusion sub-panel"));
    }

    let terms = sub_panel
        .panel_items
        .iter()
        .map(|item| translate_item(panel.index, item))
        .collect::<CoreResult<Vec<_>>>()?;

    if terms.is_empty() {
        return Err(CoreError::Translation(format!(
            "panel {} has no items",
            panel.index
        )));
    }

    let any = Expression::any(terms);
    Ok(if panel.include { any } else { Expression::not(any) })
}

fn translate_item(panel_index: i32, item: &PanelItem) -> CoreResult<Expression> {
    let concept = match &item.resource {
        ItemResource::Concept(concept) => concept,
        ItemResource::Query(q) => {
            return Err(CoreError::Translation(format!(
                "saved query {q} in panel {panel_index} cannot be federated"
            )))
        }
        ItemResource::Import(i) => {
            return Err(CoreError::Translation(format!(
                "import {i} in panel {panel_index} cannot be federated"
            )))
        }
    };
    if item.recency_filter != RecencyFilter::None {
        return Err(CoreError::Translation(format!(
            "recency filter on {concept} in panel {panel_index} cannot be federated"
        )));
    }
    if !item.specializations.is_empty() {
        return Err(CoreError::Translation(format!(
            "specializations of {concept} in panel {panel_index} cannot be federated"
        )));
    }

    let urn = concept.reference().universal_id.as_ref().ok_or_else(|| {
        CoreError::Translation(format!(
            "concept {concept} in panel {panel_index} has no universal id"
        ))
    })?;
    Ok(Expression::Concept {
        display_name: urn.nss().to_string(),
        term_path: urn.to_string(),
        constraint: item.numeric_filter.as_ref().map(render_constraint),
    })
}

fn render_constraint(filter: &NumericFilter) -> String {
    let values: Vec<String> = filter.filter.iter().map(f64::to_string).collect();
    let op = match filter.filter_type {
        NumericFilterType::EqualTo => "=",
        NumericFilterType::GreaterThan => ">",
        NumericFilterType::GreaterThanOrEqualTo => ">=",
        NumericFilterType::LessThan => "<",
        NumericFilterType::LessThanOrEqualTo => "<=",
        NumericFilterType::Between => "between",
    };
    format!("{op} {}", values.join(" and "))
}

/// Wraps a translated expression into a run-query stamped with this node's identity.
pub fn build_run_query(
    hub: &HubConfig,
    correlation_id: i64,
    user: &UserContext,
    query_name: &str,
    expression: Expression,
    now: DateTime<Utc>,
) -> RunQuery {
    let version_info = VersionInfo::created_at(now);

    RunQuery {
        id: correlation_id,
        version_info: version_info.clone(),
        status: QueryStatus::ReadyForTransfer,
        query_definition: QueryDefinition { expression },
        researcher: Researcher {
            id: hub.researcher_id(),
            version_info: version_info.clone(),
            user_name: user.username.as_str().to_string(),
            user_domain_name: hub.user_domain().to_string(),
            node_id: hub.node_id(),
        },
        topic: Topic {
            id: hub.topic_id(),
            version_info,
            researcher_id: hub.researcher_id(),
            name: hub.topic_name().to_string(),
            description: query_name.to_string(),
        },
        node_of_origin_id: hub.node_id(),
        query_name: query_name.to_string(),
        output: ResultOutputType::Count,
    }
}
