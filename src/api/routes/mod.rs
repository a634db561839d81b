pub mod agencies;
pub mod agents;
pub mod leaderboard;
pub mod meta;
pub mod refresh;

use serde::Serialize;

use crate::api::round_to;
use crate::api::state::AppState;
use crate::calculate::{self, TrendPoint};
use crate::models::{EntityId, PlayerContractRecord, Season};

/// One client in a best/worst deal list.
#[derive(Debug, Serialize)]
pub struct ClientView {
    pub id: EntityId,
    pub player_name: String,
    pub agent_name: String,
    pub agency_name: String,
    pub total_cost: f64,
    pub total_value: f64,
    pub dollars_above_value: f64,
    pub capture_pct: Option<f64>,
    pub headshot: Option<String>,
}

impl ClientView {
    fn new(record: &PlayerContractRecord, state: &AppState) -> Self {
        Self {
            id: record.id.clone(),
            player_name: record.player_name.clone(),
            agent_name: record.agent_name.clone(),
            agency_name: record.agency_name.clone(),
            total_cost: record.total_cost,
            total_value: record.total_value,
            dollars_above_value: record.dollars_above_value(),
            capture_pct: calculate::capture_ratio(record.total_cost, record.total_value)
                .map(|r| round_to(r * 100.0, 2)),
            headshot: state.headshot_url(&record.player_name),
        }
    }
}

/// One season on a trend chart.
#[derive(Debug, Serialize)]
pub struct TrendView {
    pub season: Season,
    pub label: String,

    /// `None` is drawn as "no data"
    pub capture_pct: Option<f64>,
    pub cost: f64,
    pub value: f64,
    pub clients: u32,
}

impl From<TrendPoint> for TrendView {
    fn from(point: TrendPoint) -> Self {
        Self {
            label: point.season.label(),
            season: point.season,
            capture_pct: point.capture_pct.map(|p| round_to(p, 2)),
            cost: point.cost,
            value: point.value,
            clients: point.clients,
        }
    }
}

/// Client-level sections shared by agent and agency profiles.
#[derive(Debug, Serialize)]
pub struct ClientBreakdown {
    pub clients: usize,
    pub aggregate_capture_pct: Option<f64>,
    pub trend: Vec<TrendView>,
    pub top_clients: Vec<ClientView>,
    pub bottom_clients: Vec<ClientView>,
}

impl ClientBreakdown {
    fn new(records: &[&PlayerContractRecord], seasons: &[Season], state: &AppState) -> Self {
        let (top, bottom) = calculate::top_and_bottom(records, state.config.leaderboard.client_list_size);
        Self {
            clients: records.len(),
            aggregate_capture_pct: calculate::aggregate_capture_pct(records).map(|p| round_to(p, 2)),
            trend: calculate::season_trend(records, seasons)
                .into_iter()
                .map(TrendView::from)
                .collect(),
            top_clients: top.into_iter().map(|r| ClientView::new(r, state)).collect(),
            bottom_clients: bottom.into_iter().map(|r| ClientView::new(r, state)).collect(),
        }
    }
}
