//! Value-capture calculations.
//!
//! Computes derived metrics from player contract records that have already
//! been filtered to one agent or agency:
//! - Per-season and six-year capture percentage (cost / on-ice value)
//! - Season trend lines for profile charts
//! - Per-group season capture for leaderboards, with a minimum client count
//! - Best and worst client deals
//!
//! Missing cost or value cells count as zero in every sum. A ratio whose
//! value side sums to zero is undefined and comes back as `None`.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{PlayerContractRecord, Season};
use crate::names::name_key;

/// Minimum-client rule default: groups need more than this many clients
/// with data in a season to get a season-level figure.
pub const DEFAULT_MIN_CLIENTS: u32 = 2;

/// Summed cost and value for a set of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CaptureTotals {
    pub cost: f64,
    pub value: f64,

    /// Records that had an on-ice value figure
    pub clients: u32,
}

impl CaptureTotals {
    fn add(&mut self, cost: Option<f64>, value: Option<f64>) {
        self.cost += cost.unwrap_or(0.0);
        if let Some(v) = value {
            self.value += v;
            self.clients += 1;
        }
    }

    /// Cost as a percentage of value, `None` when value sums to zero.
    pub fn pct(&self) -> Option<f64> {
        capture_ratio(self.cost, self.value).map(|r| r * 100.0)
    }

    /// Cost as a multiplier of value.
    pub fn ratio(&self) -> Option<f64> {
        capture_ratio(self.cost, self.value)
    }
}

/// `cost / value`, or `None` when the result would not be a finite number.
pub fn capture_ratio(cost: f64, value: f64) -> Option<f64> {
    if value > 0.0 && value.is_finite() && cost.is_finite() {
        Some(cost / value)
    } else {
        None
    }
}

/// Sum one season's cost and value across `records`.
pub fn season_totals(records: &[&PlayerContractRecord], season: Season) -> CaptureTotals {
    let mut totals = CaptureTotals::default();
    for record in records {
        let line = record.season(season);
        totals.add(line.cost, line.value);
    }
    totals
}

/// Sum the six-year totals across `records`.
pub fn aggregate_totals(records: &[&PlayerContractRecord]) -> CaptureTotals {
    let mut totals = CaptureTotals::default();
    for record in records {
        let value = (record.seasons_with_value() > 0 || record.total_value > 0.0)
            .then_some(record.total_value);
        totals.add(Some(record.total_cost), value);
    }
    totals
}

/// `100 * Σcost[season] / Σvalue[season]`.
pub fn capture_pct(records: &[&PlayerContractRecord], season: Season) -> Option<f64> {
    season_totals(records, season).pct()
}

/// Six-year capture percentage.
pub fn aggregate_capture_pct(records: &[&PlayerContractRecord]) -> Option<f64> {
    aggregate_totals(records).pct()
}

/// Capture index (multiplier) derived from player rows, for entities whose
/// summary row does not carry one.
pub fn derive_capture_index(records: &[&PlayerContractRecord]) -> Option<f64> {
    aggregate_totals(records).ratio()
}

/// One point on a capture trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub season: Season,

    /// `None` renders as "no data"
    pub capture_pct: Option<f64>,
    pub cost: f64,
    pub value: f64,
    pub clients: u32,
}

/// One trend point per season, in the order given.
pub fn season_trend(records: &[&PlayerContractRecord], seasons: &[Season]) -> Vec<TrendPoint> {
    seasons
        .iter()
        .map(|&season| {
            let totals = season_totals(records, season);
            TrendPoint {
                season,
                capture_pct: totals.pct(),
                cost: totals.cost,
                value: totals.value,
                clients: totals.clients,
            }
        })
        .collect()
}

/// Season capture for one agent or agency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSeasonCapture {
    pub name: String,
    pub capture_pct: f64,
    pub clients: u32,
}

/// Season capture per group (agent or agency, picked by `key`).
///
/// Only groups with more than `min_clients` clients holding a value in
/// `season` are reported, and only when their capture is defined. Output
/// is sorted by capture descending; ties keep first-appearance order.
pub fn season_capture_by_group<F>(
    records: &[&PlayerContractRecord],
    season: Season,
    key: F,
    min_clients: u32,
) -> Vec<GroupSeasonCapture>
where
    F: Fn(&PlayerContractRecord) -> &str,
{
    // Keyed by `name_key`; the first spelling seen is the one displayed
    let mut order: Vec<(String, &str)> = Vec::new();
    let mut groups: HashMap<String, Vec<&PlayerContractRecord>> = HashMap::new();
    for &record in records {
        let name = key(record);
        let group_key = name_key(name);
        if group_key.is_empty() {
            continue;
        }
        groups
            .entry(group_key.clone())
            .or_insert_with(|| {
                order.push((group_key, name));
                Vec::new()
            })
            .push(record);
    }

    let mut out: Vec<GroupSeasonCapture> = order
        .into_iter()
        .filter_map(|(group_key, name)| {
            let totals = season_totals(&groups[&group_key], season);
            if totals.clients <= min_clients {
                return None;
            }
            totals.pct().map(|capture_pct| GroupSeasonCapture {
                name: name.to_string(),
                capture_pct,
                clients: totals.clients,
            })
        })
        .collect();

    out.sort_by(|a, b| b.capture_pct.total_cmp(&a.capture_pct));
    out
}

/// The `n` clients paid most above their value, and the `n` paid most
/// below it (most underpaid first).
pub fn top_and_bottom<'a>(
    records: &[&'a PlayerContractRecord],
    n: usize,
) -> (Vec<&'a PlayerContractRecord>, Vec<&'a PlayerContractRecord>) {
    let mut sorted: Vec<&PlayerContractRecord> = records.to_vec();
    sorted.sort_by(|a, b| b.dollars_above_value().total_cmp(&a.dollars_above_value()));

    let top: Vec<_> = sorted.iter().take(n).copied().collect();
    let bottom: Vec<_> = sorted.iter().rev().take(n).copied().collect();
    (top, bottom)
}

/// Share of clients paid at least their on-ice value.
pub fn client_win_rate(records: &[&PlayerContractRecord]) -> Option<f64> {
    let rated: Vec<_> = records.iter().filter(|r| r.total_value > 0.0).collect();
    let wins = rated.iter().filter(|r| r.dollars_above_value() >= 0.0).count() as u32;
    calculate_win_rate(wins, rated.len() as u32)
}

/// Calculate win rate from wins out of total, `None` for an empty sample.
pub fn calculate_win_rate(wins: u32, total: u32) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(wins as f64 / total as f64)
    }
}
