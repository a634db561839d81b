use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{ApiError, Pagination, PaginationMeta};
use crate::models::{AgencySummary, ValueTier};

use super::agents::AgentRow;
use super::ClientBreakdown;

#[derive(Debug, Deserialize)]
pub struct AgencyListParams {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AgencyRow {
    #[serde(flatten)]
    pub agency: AgencySummary,
    pub tier: ValueTier,
}

impl From<&AgencySummary> for AgencyRow {
    fn from(agency: &AgencySummary) -> Self {
        Self {
            tier: ValueTier::from_capture_index(agency.metrics.capture_index),
            agency: agency.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgencyListResponse {
    pub agencies: Vec<AgencyRow>,
    pub derived: bool,
    pub pagination: PaginationMeta,
}

pub async fn list_agencies(
    State(state): State<AppState>,
    Query(params): Query<AgencyListParams>,
) -> Result<Json<AgencyListResponse>, ApiError> {
    let dataset = state.dataset().await?;
    let pagination = Pagination::new(params.page, params.page_size);

    let matches = dataset.search_agencies(params.q.as_deref().unwrap_or(""));
    let agencies = pagination
        .slice(&matches)
        .iter()
        .map(|a| AgencyRow::from(*a))
        .collect();

    Ok(Json(AgencyListResponse {
        agencies,
        derived: dataset.agencies_derived,
        pagination: PaginationMeta::new(&pagination, matches.len() as u32),
    }))
}

#[derive(Debug, Serialize)]
pub struct AgencyProfile {
    #[serde(flatten)]
    pub agency: AgencyRow,
    pub agents: Vec<AgentRow>,
    #[serde(flatten)]
    pub breakdown: ClientBreakdown,
}

pub async fn get_agency(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgencyProfile>, ApiError> {
    let dataset = state.dataset().await?;
    let agency = dataset
        .find_agency(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Agency {} not found", id)))?;

    let agents = dataset
        .agents_in_agency(&agency.name)
        .into_iter()
        .map(AgentRow::from)
        .collect();
    let records = dataset.records_for_agency(&agency.name);
    let breakdown = ClientBreakdown::new(&records, &dataset.seasons, &state);

    Ok(Json(AgencyProfile {
        agency: AgencyRow::from(agency),
        agents,
        breakdown,
    }))
}
