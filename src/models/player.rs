//! Player contract records from the player-by-agent worksheet.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{EntityId, Season, SeasonLine};

/// One player, as represented by one agent/agency, with six seasons of
/// cost and on-ice value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerContractRecord {
    pub id: EntityId,
    pub player_name: String,
    pub birth_date: Option<NaiveDate>,
    pub agent_name: String,
    pub agency_name: String,
    pub seasons: BTreeMap<Season, SeasonLine>,

    /// Six-year compensation total
    pub total_cost: f64,

    /// Six-year on-ice value total
    pub total_value: f64,
}

impl PlayerContractRecord {
    /// Build a record. Totals are summed from the season lines; the
    /// worksheet's own aggregate columns are only used when no season has
    /// a figure for that side.
    pub fn new(
        player_name: String,
        birth_date: Option<NaiveDate>,
        agent_name: String,
        agency_name: String,
        seasons: BTreeMap<Season, SeasonLine>,
        sheet_total_cost: Option<f64>,
        sheet_total_value: Option<f64>,
    ) -> Self {
        let total_cost = sum_present(seasons.values().map(|l| l.cost))
            .or(sheet_total_cost)
            .unwrap_or(0.0);
        let total_value = sum_present(seasons.values().map(|l| l.value))
            .or(sheet_total_value)
            .unwrap_or(0.0);

        let id = EntityId::player(&player_name, birth_date, &agent_name);

        Self {
            id,
            player_name,
            birth_date,
            agent_name,
            agency_name,
            seasons,
            total_cost,
            total_value,
        }
    }

    /// The line for `season`; empty when the player has no data for it.
    pub fn season(&self, season: Season) -> SeasonLine {
        self.seasons.get(&season).copied().unwrap_or_default()
    }

    /// Compensation minus on-ice value over the six-year window. Positive
    /// means the player was paid more than the value they delivered.
    pub fn dollars_above_value(&self) -> f64 {
        self.total_cost - self.total_value
    }

    /// Seasons with an on-ice value figure.
    pub fn seasons_with_value(&self) -> usize {
        self.seasons.values().filter(|l| l.value.is_some()).count()
    }
}

fn sum_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}
