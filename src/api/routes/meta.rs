use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{round_to, ApiError};
use crate::calculate;
use crate::leaderboard::{Leaderboard, LeaderboardQuery, Ranked, SortOrder};
use crate::models::{EntityId, PlayerContractRecord, Season, ValueTier};

use super::leaderboard::EntityKind;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// An agent or agency named on the overview.
#[derive(Debug, Serialize)]
pub struct Highlight {
    pub id: EntityId,
    pub name: String,
    pub capture_index: Option<f64>,
}

impl Highlight {
    fn new<T: Ranked>(row: &T) -> Self {
        Self {
            id: row.id().clone(),
            name: row.name().to_string(),
            capture_index: row.metrics().capture_index,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SeasonSummary {
    pub season: Season,
    pub label: String,
    pub capture_pct: Option<f64>,
    pub clients: u32,
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub source: String,
    pub loaded_at: DateTime<Utc>,
    pub agents: usize,
    pub agencies: usize,
    pub players: usize,
    pub ranks_available: bool,
    pub headshots: usize,
    pub seasons: Vec<SeasonSummary>,
    pub best_capture: Option<Highlight>,
    pub worst_capture: Option<Highlight>,
}

fn first_rated<T: Ranked>(board: &Leaderboard<'_, T>) -> Option<Highlight> {
    board
        .iter()
        .find(|e| e.value.is_some())
        .map(|e| Highlight::new(e.row))
}

pub async fn overview(State(state): State<AppState>) -> Result<Json<OverviewResponse>, ApiError> {
    let dataset = state.dataset().await?;

    let records: Vec<&PlayerContractRecord> = dataset.players.iter().collect();
    let seasons = calculate::season_trend(&records, &dataset.seasons)
        .into_iter()
        .map(|p| SeasonSummary {
            label: p.season.label(),
            season: p.season,
            capture_pct: p.capture_pct.map(|v| round_to(v, 2)),
            clients: p.clients,
        })
        .collect();

    let best = Leaderboard::build(&dataset.agents, LeaderboardQuery::default(), &state.exclusions);
    let worst = Leaderboard::build(
        &dataset.agents,
        LeaderboardQuery {
            order: SortOrder::Ascending,
            ..Default::default()
        },
        &state.exclusions,
    );

    Ok(Json(OverviewResponse {
        source: state.store.source_description(),
        loaded_at: dataset.loaded_at,
        agents: dataset.agents.len(),
        agencies: dataset.agencies.len(),
        players: dataset.player_count(),
        ranks_available: !dataset.ranks.is_empty(),
        headshots: state.headshots.len(),
        seasons,
        best_capture: first_rated(&best),
        worst_capture: first_rated(&worst),
    }))
}

#[derive(Debug, Serialize)]
pub struct Definition {
    pub term: &'static str,
    pub definition: &'static str,
}

const DEFINITIONS: &[Definition] = &[
    Definition {
        term: "Market Value Capture",
        definition: "Compensation paid to an agent's clients divided by the on-ice value those \
                     clients delivered, as a percentage or decimal multiplier. Above 100% means \
                     clients were paid more than their play was worth.",
    },
    Definition {
        term: "Player Contribution (PC)",
        definition: "A precomputed valuation of a player's season performance in dollars, \
                     supplied with the data rather than computed here.",
    },
    Definition {
        term: "Cost",
        definition: "What a player was paid for a season.",
    },
    Definition {
        term: "Contracts Tracked (CT)",
        definition: "Number of qualifying contracts attributed to an agent or agency within \
                     the dataset's six-season window.",
    },
    Definition {
        term: "Win %",
        definition: "Share of an agent's tracked contracts that paid the client at least \
                     their on-ice value.",
    },
    Definition {
        term: "Total Contract Value",
        definition: "Sum of compensation across an agent's or agency's tracked contracts.",
    },
    Definition {
        term: "Dollars Above Value",
        definition: "Six-season cost minus six-season player contribution for one client. \
                     Positive means the client was paid above their value.",
    },
    Definition {
        term: "PIBA",
        definition: "The player-level worksheet joining player, agent, agency and per-season \
                     cost and value columns.",
    },
    Definition {
        term: "Season leaderboard",
        definition: "Capture per agent or agency for a single season, computed from player \
                     rows. Only groups with more than the minimum client count qualify.",
    },
];

#[derive(Debug, Serialize)]
pub struct TierDefinition {
    pub tier: ValueTier,
    pub label: String,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DefinitionsResponse {
    pub definitions: &'static [Definition],
    pub tiers: Vec<TierDefinition>,
    pub min_clients: u32,
}

pub async fn definitions(State(state): State<AppState>) -> Json<DefinitionsResponse> {
    Json(DefinitionsResponse {
        definitions: DEFINITIONS,
        tiers: ValueTier::ALL
            .into_iter()
            .map(|tier| TierDefinition {
                tier,
                label: tier.to_string(),
                description: tier.description(),
            })
            .collect(),
        min_clients: state.config.leaderboard.min_clients,
    })
}

#[derive(Debug, Deserialize)]
pub struct ClassificationParams {
    pub entity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Classification {
    pub tier: ValueTier,
    pub label: String,
    pub description: &'static str,
    pub members: Vec<Highlight>,
}

#[derive(Debug, Serialize)]
pub struct ClassificationsResponse {
    pub entity: EntityKind,
    pub classifications: Vec<Classification>,
}

fn classify<T: Ranked>(rows: &[T], state: &AppState) -> Vec<Classification> {
    let board = Leaderboard::build(rows, LeaderboardQuery::default(), &state.exclusions);
    ValueTier::ALL
        .into_iter()
        .map(|tier| Classification {
            tier,
            label: tier.to_string(),
            description: tier.description(),
            members: board
                .iter()
                .filter(|e| ValueTier::from_capture_index(e.value) == tier)
                .map(|e| Highlight::new(e.row))
                .collect(),
        })
        .collect()
}

/// Agents (or agencies) grouped by value tier, best capture first within
/// each tier.
pub async fn classifications(
    State(state): State<AppState>,
    Query(params): Query<ClassificationParams>,
) -> Result<Json<ClassificationsResponse>, ApiError> {
    let entity = match params.entity.as_deref() {
        Some(s) => s.parse::<EntityKind>().map_err(ApiError::BadRequest)?,
        None => EntityKind::default(),
    };
    let dataset = state.dataset().await?;

    let classifications = match entity {
        EntityKind::Agents => classify(&dataset.agents, &state),
        EntityKind::Agencies => classify(&dataset.agencies, &state),
    };

    Ok(Json(ClassificationsResponse {
        entity,
        classifications,
    }))
}
