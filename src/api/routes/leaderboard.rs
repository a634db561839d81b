use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{round_to, ApiError, Pagination, PaginationMeta};
use crate::calculate;
use crate::leaderboard::{Leaderboard, LeaderboardQuery, Ranked, SortOrder};
use crate::models::{EntityId, Metric, PlayerContractRecord, Season, SummaryMetrics};

/// Which summary table a leaderboard ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Agents,
    Agencies,
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agents" | "agent" => Ok(EntityKind::Agents),
            "agencies" | "agency" => Ok(EntityKind::Agencies),
            other => Err(format!("unknown entity: {}", other)),
        }
    }
}

fn parse_param<T: FromStr<Err = String> + Default>(raw: Option<&str>) -> Result<T, ApiError> {
    match raw {
        Some(s) if !s.trim().is_empty() => s.parse().map_err(ApiError::BadRequest),
        _ => Ok(T::default()),
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub entity: Option<String>,
    pub metric: Option<String>,
    pub order: Option<String>,
    pub min_contracts: Option<u32>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardRow {
    pub position: usize,
    pub id: EntityId,
    pub name: String,
    pub value: Option<f64>,
    #[serde(flatten)]
    pub metrics: SummaryMetrics,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub entity: EntityKind,
    pub metric: Metric,
    pub metric_label: &'static str,
    pub order: SortOrder,
    pub min_contracts: Option<u32>,
    pub entries: Vec<LeaderboardRow>,
    pub pagination: PaginationMeta,
}

fn page_rows<T: Ranked>(board: &Leaderboard<'_, T>, pagination: &Pagination) -> Vec<LeaderboardRow> {
    board
        .page(pagination.offset(), pagination.page_size as usize)
        .iter()
        .map(|e| LeaderboardRow {
            position: e.position,
            id: e.row.id().clone(),
            name: e.row.name().to_string(),
            value: e.value,
            metrics: e.row.metrics().clone(),
        })
        .collect()
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let entity: EntityKind = parse_param(params.entity.as_deref())?;
    let query = LeaderboardQuery {
        metric: parse_param(params.metric.as_deref())?,
        order: parse_param(params.order.as_deref())?,
        min_contracts: params.min_contracts,
    };
    let pagination = Pagination::new(params.page, params.page_size);
    let dataset = state.dataset().await?;

    let (entries, total) = match entity {
        EntityKind::Agents => {
            let board = Leaderboard::build(&dataset.agents, query, &state.exclusions);
            (page_rows(&board, &pagination), board.len())
        }
        EntityKind::Agencies => {
            let board = Leaderboard::build(&dataset.agencies, query, &state.exclusions);
            (page_rows(&board, &pagination), board.len())
        }
    };

    Ok(Json(LeaderboardResponse {
        entity,
        metric: query.metric,
        metric_label: query.metric.label(),
        order: query.order,
        min_contracts: query.min_contracts,
        entries,
        pagination: PaginationMeta::new(&pagination, total as u32),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SeasonLeaderboardParams {
    pub entity: Option<String>,
    pub min_clients: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SeasonLeaderboardRow {
    pub position: usize,
    pub name: String,
    pub capture_pct: f64,
    pub clients: u32,
}

#[derive(Debug, Serialize)]
pub struct SeasonLeaderboardResponse {
    pub season: Season,
    pub label: String,
    pub entity: EntityKind,
    pub min_clients: u32,
    pub entries: Vec<SeasonLeaderboardRow>,
}

/// Capture percentage per agent or agency for one season, computed from
/// player rows.
pub async fn season_leaderboard(
    State(state): State<AppState>,
    Path(season): Path<String>,
    Query(params): Query<SeasonLeaderboardParams>,
) -> Result<Json<SeasonLeaderboardResponse>, ApiError> {
    let season: Season = season
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{}", e)))?;
    let entity: EntityKind = parse_param(params.entity.as_deref())?;
    let min_clients = params
        .min_clients
        .unwrap_or(state.config.leaderboard.min_clients);

    let dataset = state.dataset().await?;
    if !dataset.seasons.contains(&season) {
        return Err(ApiError::NotFound(format!("Season {} not tracked", season)));
    }

    let records: Vec<&PlayerContractRecord> = dataset
        .players
        .iter()
        .filter(|p| !state.exclusions.contains(&p.agent_name))
        .collect();

    let groups = match entity {
        EntityKind::Agents => {
            calculate::season_capture_by_group(&records, season, |r| r.agent_name.as_str(), min_clients)
        }
        EntityKind::Agencies => {
            calculate::season_capture_by_group(&records, season, |r| r.agency_name.as_str(), min_clients)
        }
    };

    let entries = groups
        .into_iter()
        .enumerate()
        .map(|(i, g)| SeasonLeaderboardRow {
            position: i + 1,
            name: g.name,
            capture_pct: round_to(g.capture_pct, 2),
            clients: g.clients,
        })
        .collect();

    Ok(Json(SeasonLeaderboardResponse {
        season,
        label: season.label(),
        entity,
        min_clients,
        entries,
    }))
}
