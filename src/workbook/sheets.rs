//! Worksheet schemas: header aliases and row conversion into models.
//!
//! Only the entity name column is required. A missing metric column makes
//! that metric unavailable (`None`) for every row instead of failing the
//! load.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{cell, Table, WorkbookError};
use crate::models::{
    AgencySummary, AgentSummary, Metric, PlayerContractRecord, RankEntry, Season, SeasonLine,
    SummaryMetrics,
};
use crate::names::NameNormalizer;

pub const AGENT_NAME: &[&str] = &["Agent Name", "Agent"];
pub const AGENCY_NAME: &[&str] = &["Agency Name", "Agency"];
pub const CAPTURE_INDEX: &[&str] = &[
    "Market Value Capture %",
    "Market Value Capture",
    "Dollar Index",
    "Capture Index",
];
pub const WIN_RATE: &[&str] = &["Won%", "Won %", "Win%", "Win %", "Win Rate"];
pub const CONTRACTS_TRACKED: &[&str] = &["CT", "Contracts Tracked"];
pub const TOTAL_CONTRACT_VALUE: &[&str] = &["Total Contract Value", "TCV"];

pub const PLAYER_NAME: &[&str] = &["Combined Names", "Player Name", "Player", "Name"];
pub const FIRST_NAME: &[&str] = &["First Name", "First"];
pub const LAST_NAME: &[&str] = &["Last Name", "Last"];
pub const BIRTH_DATE: &[&str] = &["Birth Date", "Birthdate", "DOB", "Date of Birth"];
pub const TOTAL_COST: &[&str] = &["Total Cost", "6-Year Cost", "Six Year Cost", "Total Cap Hit"];
pub const TOTAL_VALUE: &[&str] = &["Total PC", "6-Year PC", "Six Year PC", "Total Value"];

/// Header aliases for one season's cost column.
fn season_cost_headers(season: Season) -> Vec<String> {
    season_headers(season, &["Cost", "Cap Hit", "Cash", "AAV"])
}

/// Header aliases for one season's on-ice value column.
fn season_value_headers(season: Season) -> Vec<String> {
    season_headers(season, &["PC", "Value", "Player Contribution"])
}

fn season_headers(season: Season, suffixes: &[&str]) -> Vec<String> {
    let labels = [
        season.label(),
        season.long_label(),
        (season.start_year() + 1).to_string(),
    ];
    labels
        .iter()
        .flat_map(|label| suffixes.iter().map(move |s| format!("{} {}", label, s)))
        .collect()
}

fn column_or_warn(table: &Table, label: &str, aliases: &[&str]) -> Option<usize> {
    let col = table.column(aliases);
    if col.is_none() {
        warn!("Worksheet {} has no {} column; metric unavailable", table.name, label);
    }
    col
}

struct MetricColumns {
    capture_index: Option<usize>,
    win_rate: Option<usize>,
    contracts_tracked: Option<usize>,
    total_contract_value: Option<usize>,
}

impl MetricColumns {
    fn locate(table: &Table) -> Self {
        Self {
            capture_index: column_or_warn(table, "capture index", CAPTURE_INDEX),
            win_rate: column_or_warn(table, "win rate", WIN_RATE),
            contracts_tracked: column_or_warn(table, "contracts tracked", CONTRACTS_TRACKED),
            total_contract_value: column_or_warn(table, "total contract value", TOTAL_CONTRACT_VALUE),
        }
    }

    fn read(&self, entity: &str, row: &[super::Cell]) -> SummaryMetrics {
        SummaryMetrics::new(
            entity,
            cell(row, self.contracts_tracked).as_count().unwrap_or(0),
            cell(row, self.total_contract_value).as_f64(),
            cell(row, self.win_rate).as_f64(),
            cell(row, self.capture_index).as_f64(),
        )
    }

    fn get(&self, metric: Metric) -> Option<usize> {
        match metric {
            Metric::CaptureIndex => self.capture_index,
            Metric::WinRate => self.win_rate,
            Metric::ContractsTracked => self.contracts_tracked,
            Metric::TotalContractValue => self.total_contract_value,
        }
    }
}

/// Agent summary worksheet.
pub fn parse_agents(table: &Table, names: &NameNormalizer) -> Result<Vec<AgentSummary>, WorkbookError> {
    let name_col = table.require_column("agent name", AGENT_NAME)?;
    let agency_col = table.column(AGENCY_NAME);
    let metrics = MetricColumns::locate(table);

    let agents: Vec<AgentSummary> = table
        .rows
        .iter()
        .filter_map(|row| {
            let name = names.display_name(&cell(row, Some(name_col)).as_text()?);
            let agency = cell(row, agency_col).as_text().map(|a| names.display_org(&a));
            let m = metrics.read(&name, row);
            Some(AgentSummary::new(name, agency, m))
        })
        .collect();

    debug!("Parsed {} agents from {}", agents.len(), table.name);
    Ok(agents)
}

/// Agency summary worksheet.
pub fn parse_agencies(
    table: &Table,
    names: &NameNormalizer,
) -> Result<Vec<AgencySummary>, WorkbookError> {
    let name_col = table.require_column("agency name", AGENCY_NAME)?;
    let metrics = MetricColumns::locate(table);

    let agencies: Vec<AgencySummary> = table
        .rows
        .iter()
        .filter_map(|row| {
            let name = names.display_org(&cell(row, Some(name_col)).as_text()?);
            let m = metrics.read(&name, row);
            Some(AgencySummary::new(name, m))
        })
        .collect();

    debug!("Parsed {} agencies from {}", agencies.len(), table.name);
    Ok(agencies)
}

/// Agent rank worksheet. Uses the same headers as the summary sheet, with
/// ordinal ranks in the metric columns.
pub fn parse_ranks(table: &Table, names: &NameNormalizer) -> Result<Vec<RankEntry>, WorkbookError> {
    let name_col = table.require_column("agent name", AGENT_NAME)?;
    let metrics = MetricColumns::locate(table);

    let ranks: Vec<RankEntry> = table
        .rows
        .iter()
        .filter_map(|row| {
            let name = names.display_name(&cell(row, Some(name_col)).as_text()?);
            let mut entry = RankEntry::new(name);
            for metric in Metric::ALL {
                let rank = cell(row, metrics.get(metric)).as_count().filter(|r| *r >= 1);
                entry.set_rank(metric, rank);
            }
            Some(entry)
        })
        .collect();

    debug!("Parsed {} rank rows from {}", ranks.len(), table.name);
    Ok(ranks)
}

/// Player-by-agent (PIBA) worksheet.
pub fn parse_players(
    table: &Table,
    names: &NameNormalizer,
    seasons: &[Season],
) -> Result<Vec<PlayerContractRecord>, WorkbookError> {
    let player_col = table.column(PLAYER_NAME);
    let first_col = table.column(FIRST_NAME);
    let last_col = table.column(LAST_NAME);
    if player_col.is_none() && (first_col.is_none() || last_col.is_none()) {
        return Err(WorkbookError::MissingColumn {
            sheet: table.name.clone(),
            column: "player name".to_string(),
        });
    }
    let agent_col = table.require_column("agent name", AGENT_NAME)?;
    let agency_col = table.column(AGENCY_NAME);
    let birth_col = table.column(BIRTH_DATE);
    let total_cost_col = table.column(TOTAL_COST);
    let total_value_col = table.column(TOTAL_VALUE);

    let season_cols: Vec<(Season, Option<usize>, Option<usize>)> = seasons
        .iter()
        .map(|&season| {
            let cost_headers = season_cost_headers(season);
            let value_headers = season_value_headers(season);
            let cost = table.column(&cost_headers.iter().map(String::as_str).collect::<Vec<_>>());
            let value = table.column(&value_headers.iter().map(String::as_str).collect::<Vec<_>>());
            if cost.is_none() || value.is_none() {
                warn!(
                    "Worksheet {} is missing {} cost/value columns; season unavailable",
                    table.name, season
                );
            }
            (season, cost, value)
        })
        .collect();

    let mut skipped = 0usize;
    let mut records = Vec::with_capacity(table.len());
    for row in &table.rows {
        let raw_name = match player_col {
            Some(c) => cell(row, Some(c)).as_text(),
            None => {
                match (cell(row, first_col).as_text(), cell(row, last_col).as_text()) {
                    (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
                    (Some(only), None) | (None, Some(only)) => Some(only),
                    (None, None) => None,
                }
            }
        };
        let (Some(raw_name), Some(agent)) = (raw_name, cell(row, Some(agent_col)).as_text()) else {
            skipped += 1;
            continue;
        };

        let lines: BTreeMap<Season, SeasonLine> = season_cols
            .iter()
            .map(|&(season, cost, value)| {
                let line = SeasonLine::new(
                    cell(row, cost).as_non_negative(),
                    cell(row, value).as_non_negative(),
                );
                (season, line)
            })
            .filter(|(_, line)| !line.is_empty())
            .collect();

        records.push(PlayerContractRecord::new(
            names.display_name(&raw_name),
            cell(row, birth_col).as_date(),
            names.display_name(&agent),
            cell(row, agency_col)
                .as_text()
                .map(|a| names.display_org(&a))
                .unwrap_or_default(),
            lines,
            cell(row, total_cost_col).as_non_negative(),
            cell(row, total_value_col).as_non_negative(),
        ));
    }

    if skipped > 0 {
        debug!("Skipped {} player rows without a name or agent", skipped);
    }
    debug!("Parsed {} player records from {}", records.len(), table.name);
    Ok(records)
}
