use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{ApiError, Pagination, PaginationMeta};
use crate::models::{AgentSummary, Metric, ValueTier};

use super::ClientBreakdown;

#[derive(Debug, Deserialize)]
pub struct AgentListParams {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// An agent in a directory listing.
#[derive(Debug, Serialize)]
pub struct AgentRow {
    #[serde(flatten)]
    pub agent: AgentSummary,
    pub tier: ValueTier,
}

impl From<&AgentSummary> for AgentRow {
    fn from(agent: &AgentSummary) -> Self {
        Self {
            tier: ValueTier::from_capture_index(agent.metrics.capture_index),
            agent: agent.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentRow>,
    pub pagination: PaginationMeta,
}

pub async fn list_agents(
    State(state): State<AppState>,
    Query(params): Query<AgentListParams>,
) -> Result<Json<AgentListResponse>, ApiError> {
    let dataset = state.dataset().await?;
    let pagination = Pagination::new(params.page, params.page_size);

    let matches = dataset.search_agents(params.q.as_deref().unwrap_or(""));
    let agents = pagination
        .slice(&matches)
        .iter()
        .map(|a| AgentRow::from(*a))
        .collect();

    Ok(Json(AgentListResponse {
        agents,
        pagination: PaginationMeta::new(&pagination, matches.len() as u32),
    }))
}

/// A published rank, e.g. `#3/52`.
#[derive(Debug, Serialize)]
pub struct RankView {
    pub metric: Metric,
    pub label: &'static str,
    pub rank: u32,
    pub of: usize,
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct AgentProfile {
    #[serde(flatten)]
    pub agent: AgentRow,
    pub ranks: Vec<RankView>,
    #[serde(flatten)]
    pub breakdown: ClientBreakdown,
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentProfile>, ApiError> {
    let dataset = state.dataset().await?;
    let agent = dataset
        .find_agent(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Agent {} not found", id)))?;

    let population = dataset.rank_population();
    let ranks = dataset
        .rank_for_agent(&agent.name)
        .map(|entry| {
            Metric::ALL
                .into_iter()
                .filter_map(|metric| {
                    entry.rank(metric).map(|rank| RankView {
                        metric,
                        label: metric.label(),
                        rank,
                        of: population,
                        display: format!("#{}/{}", rank, population),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let records = dataset.records_for_agent(&agent.name);
    let breakdown = ClientBreakdown::new(&records, &dataset.seasons, &state);

    Ok(Json(AgentProfile {
        agent: AgentRow::from(agent),
        ranks,
        breakdown,
    }))
}
