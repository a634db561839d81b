//! Per-agent and per-agency summary rows, plus the precomputed rank table.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::EntityId;

/// Summary metrics an agent or agency can be ranked by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    CaptureIndex,
    WinRate,
    ContractsTracked,
    TotalContractValue,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::CaptureIndex,
        Metric::WinRate,
        Metric::ContractsTracked,
        Metric::TotalContractValue,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::CaptureIndex => "Market Value Capture",
            Metric::WinRate => "Win %",
            Metric::ContractsTracked => "Contracts Tracked",
            Metric::TotalContractValue => "Total Contract Value",
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "capture_index" | "capture" | "mvc" => Ok(Metric::CaptureIndex),
            "win_rate" | "win" | "won" => Ok(Metric::WinRate),
            "contracts_tracked" | "ct" | "contracts" => Ok(Metric::ContractsTracked),
            "total_contract_value" | "tcv" | "value" => Ok(Metric::TotalContractValue),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}

/// Aggregate metrics shared by agent and agency rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    /// Contracts tracked (CT)
    pub contracts_tracked: u32,

    pub total_contract_value: Option<f64>,

    /// Fraction in `[0, 1]`
    pub win_rate: Option<f64>,

    /// Aggregate compensation / aggregate on-ice value, as a multiplier
    pub capture_index: Option<f64>,
}

impl SummaryMetrics {
    /// Build metrics, dropping values that break the row invariants: a
    /// win rate outside `[0, 1]` or a capture index that is not positive.
    pub fn new(
        entity: &str,
        contracts_tracked: u32,
        total_contract_value: Option<f64>,
        win_rate: Option<f64>,
        capture_index: Option<f64>,
    ) -> Self {
        let win_rate = win_rate.filter(|w| {
            let ok = (0.0..=1.0).contains(w);
            if !ok {
                warn!("Dropping out-of-range win rate {} for {}", w, entity);
            }
            ok
        });
        let capture_index = capture_index.filter(|c| {
            let ok = c.is_finite() && *c > 0.0;
            if !ok {
                warn!("Dropping non-positive capture index {} for {}", c, entity);
            }
            ok
        });
        Self {
            contracts_tracked,
            total_contract_value: total_contract_value.filter(|v| v.is_finite()),
            win_rate,
            capture_index,
        }
    }

    /// Value of `metric`, as a float for sorting.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::CaptureIndex => self.capture_index,
            Metric::WinRate => self.win_rate,
            Metric::ContractsTracked => Some(self.contracts_tracked as f64),
            Metric::TotalContractValue => self.total_contract_value,
        }
    }
}

/// One row of the agent summary worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: EntityId,
    pub name: String,
    pub agency_name: Option<String>,
    #[serde(flatten)]
    pub metrics: SummaryMetrics,
}

impl AgentSummary {
    pub fn new(name: String, agency_name: Option<String>, metrics: SummaryMetrics) -> Self {
        Self {
            id: EntityId::agent(&name),
            name,
            agency_name,
            metrics,
        }
    }
}

/// One row of the agency summary worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencySummary {
    pub id: EntityId,
    pub name: String,
    #[serde(flatten)]
    pub metrics: SummaryMetrics,
}

impl AgencySummary {
    pub fn new(name: String, metrics: SummaryMetrics) -> Self {
        Self {
            id: EntityId::agency(&name),
            name,
            metrics,
        }
    }
}

/// Precomputed ordinal ranks for one agent, as published in the rank
/// worksheet. Display only: these are never recomputed and may drift from
/// the summary table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub agent_id: EntityId,
    pub agent_name: String,
    pub capture_index: Option<u32>,
    pub win_rate: Option<u32>,
    pub contracts_tracked: Option<u32>,
    pub total_contract_value: Option<u32>,
}

impl RankEntry {
    pub fn new(agent_name: String) -> Self {
        Self {
            agent_id: EntityId::agent(&agent_name),
            agent_name,
            ..Default::default()
        }
    }

    pub fn rank(&self, metric: Metric) -> Option<u32> {
        match metric {
            Metric::CaptureIndex => self.capture_index,
            Metric::WinRate => self.win_rate,
            Metric::ContractsTracked => self.contracts_tracked,
            Metric::TotalContractValue => self.total_contract_value,
        }
    }

    pub fn set_rank(&mut self, metric: Metric, rank: Option<u32>) {
        match metric {
            Metric::CaptureIndex => self.capture_index = rank,
            Metric::WinRate => self.win_rate = rank,
            Metric::ContractsTracked => self.contracts_tracked = rank,
            Metric::TotalContractValue => self.total_contract_value = rank,
        }
    }
}
