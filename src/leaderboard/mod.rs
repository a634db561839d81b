//! Leaderboards over agent and agency summary rows.
//!
//! Sorting is stable, so rows with equal metric values keep their
//! worksheet order. Rows with no value for the chosen metric always sort
//! after rows that have one.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{AgencySummary, AgentSummary, EntityId, Metric, SummaryMetrics};
use crate::names::name_key;

/// A row that can appear on a leaderboard.
pub trait Ranked {
    fn id(&self) -> &EntityId;
    fn name(&self) -> &str;
    fn metrics(&self) -> &SummaryMetrics;

    fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics().get(metric)
    }
}

impl Ranked for AgentSummary {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> &SummaryMetrics {
        &self.metrics
    }
}

impl Ranked for AgencySummary {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> &SummaryMetrics {
        &self.metrics
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Descending,
    Ascending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "desc" | "descending" => Ok(SortOrder::Descending),
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

/// What to rank by and which rows qualify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaderboardQuery {
    pub metric: Metric,
    pub order: SortOrder,

    /// Only rows with at least this many contracts tracked
    pub min_contracts: Option<u32>,
}

/// Names kept off every leaderboard regardless of their numbers.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    keys: HashSet<String>,
}

impl ExclusionList {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            keys: names.iter().map(|n| name_key(n.as_ref())).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains(&name_key(name))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Rows with at least `min_contracts` contracts tracked, in input order.
pub fn filter_min_contracts<'a, T: Ranked>(rows: &[&'a T], min_contracts: u32) -> Vec<&'a T> {
    rows.iter()
        .copied()
        .filter(|r| r.metrics().contracts_tracked >= min_contracts)
        .collect()
}

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry<'a, T> {
    /// 1-based position
    pub position: usize,
    pub value: Option<f64>,
    pub row: &'a T,
}

/// An ordered leaderboard. Finite and restartable: [`Leaderboard::iter`]
/// can be called any number of times.
#[derive(Debug, Clone)]
pub struct Leaderboard<'a, T> {
    pub query: LeaderboardQuery,
    entries: Vec<LeaderboardEntry<'a, T>>,
}

impl<'a, T: Ranked> Leaderboard<'a, T> {
    pub fn build(rows: &'a [T], query: LeaderboardQuery, exclusions: &ExclusionList) -> Self {
        let mut selected: Vec<&'a T> = rows.iter().filter(|r| !exclusions.contains(r.name())).collect();
        if let Some(min) = query.min_contracts {
            selected = filter_min_contracts(&selected, min);
        }

        selected.sort_by(|a, b| compare(a.metric(query.metric), b.metric(query.metric), query.order));

        let entries = selected
            .into_iter()
            .enumerate()
            .map(|(i, row)| LeaderboardEntry {
                position: i + 1,
                value: row.metric(query.metric),
                row,
            })
            .collect();

        Self { query, entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeaderboardEntry<'a, T>> + '_ {
        self.entries.iter()
    }

    /// A page of entries, `offset` from the top.
    pub fn page(&self, offset: usize, limit: usize) -> &[LeaderboardEntry<'a, T>] {
        let start = offset.min(self.entries.len());
        let end = start.saturating_add(limit).min(self.entries.len());
        &self.entries[start..end]
    }

    /// Position of the row named `name`, if it is on the board.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        let key = name_key(name);
        self.entries
            .iter()
            .find(|e| name_key(e.row.name()) == key)
            .map(|e| e.position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn compare(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match order {
            SortOrder::Descending => b.total_cmp(&a),
            SortOrder::Ascending => a.total_cmp(&b),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn agent(name: &str, ct: u32, capture: Option<f64>, win: Option<f64>) -> AgentSummary {
        AgentSummary::new(
            name.to_string(),
            None,
            SummaryMetrics::new(name, ct, Some(ct as f64 * 1e6), win, capture),
        )
    }

    fn sample() -> Vec<AgentSummary> {
        vec![
            agent("A", 10, Some(1.05), Some(0.5)),
            agent("B", 2, Some(1.30), Some(0.7)),
            agent("C", 8, None, Some(0.4)),
            agent("D", 5, Some(0.90), None),
            agent("E", 12, Some(1.05), Some(0.6)),
            agent("Unknown", 50, Some(3.0), Some(0.9)),
        ]
    }

    fn names<T: Ranked>(board: &Leaderboard<'_, T>) -> Vec<String> {
        board.iter().map(|e| e.row.name().to_string()).collect()
    }

    #[test]
    fn test_default_is_capture_descending() {
        let rows = sample();
        let board = Leaderboard::build(&rows, LeaderboardQuery::default(), &ExclusionList::default());
        assert_eq!(names(&board), vec!["Unknown", "B", "A", "E", "D", "C"]);
        assert_eq!(board.iter().map(|e| e.position).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_ordering_is_monotonic() {
        let rows = sample();
        for metric in Metric::ALL {
            for order in [SortOrder::Descending, SortOrder::Ascending] {
                let query = LeaderboardQuery { metric, order, min_contracts: None };
                let board = Leaderboard::build(&rows, query, &ExclusionList::default());
                let values: Vec<f64> = board.iter().filter_map(|e| e.value).collect();
                for pair in values.windows(2) {
                    match order {
                        SortOrder::Descending => assert!(pair[0] >= pair[1]),
                        SortOrder::Ascending => assert!(pair[0] <= pair[1]),
                    }
                }
                // Missing values trail
                let first_none = board.iter().position(|e| e.value.is_none());
                if let Some(i) = first_none {
                    assert!(board.iter().skip(i).all(|e| e.value.is_none()));
                }
            }
        }
    }

    #[test]
    fn test_ties_keep_source_order() {
        let rows = sample();
        let board = Leaderboard::build(&rows, LeaderboardQuery::default(), &ExclusionList::default());
        let a = board.position_of("A").unwrap();
        let e = board.position_of("E").unwrap();
        assert!(a < e);

        let query = LeaderboardQuery { order: SortOrder::Ascending, ..Default::default() };
        let board = Leaderboard::build(&rows, query, &ExclusionList::default());
        assert!(board.position_of("A").unwrap() < board.position_of("E").unwrap());
    }

    #[test]
    fn test_excluded_names_never_appear() {
        let rows = sample();
        let exclusions = ExclusionList::new(&["unknown", " B "]);
        for metric in Metric::ALL {
            let query = LeaderboardQuery { metric, ..Default::default() };
            let board = Leaderboard::build(&rows, query, &exclusions);
            assert!(board.iter().all(|e| !exclusions.contains(e.row.name())));
            assert_eq!(board.len(), 4);
        }
    }

    #[test]
    fn test_min_contracts_filter() {
        let rows = sample();
        let query = LeaderboardQuery { min_contracts: Some(8), ..Default::default() };
        let board = Leaderboard::build(&rows, query, &ExclusionList::default());
        assert_eq!(names(&board), vec!["Unknown", "A", "E", "C"]);
    }

    #[test]
    fn test_min_contracts_filter_is_idempotent() {
        let rows = sample();
        let refs: Vec<&AgentSummary> = rows.iter().collect();
        for min in [0, 3, 8, 100] {
            let once = filter_min_contracts(&refs, min);
            let twice = filter_min_contracts(&once, min);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_iter_is_restartable() {
        let rows = sample();
        let board = Leaderboard::build(&rows, LeaderboardQuery::default(), &ExclusionList::default());
        let first: Vec<_> = board.iter().map(|e| e.position).collect();
        let second: Vec<_> = board.iter().map(|e| e.position).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_page_bounds() {
        let rows = sample();
        let board = Leaderboard::build(&rows, LeaderboardQuery::default(), &ExclusionList::default());
        assert_eq!(board.page(0, 2).len(), 2);
        assert_eq!(board.page(5, 10).len(), 1);
        assert!(board.page(50, 10).is_empty());
    }

    #[test]
    fn test_works_for_agencies() {
        let rows = vec![
            AgencySummary::new("Octagon".into(), SummaryMetrics::new("Octagon", 30, None, None, Some(0.95))),
            AgencySummary::new("CAA".into(), SummaryMetrics::new("CAA", 40, None, None, Some(1.1))),
        ];
        let board = Leaderboard::build(&rows, LeaderboardQuery::default(), &ExclusionList::default());
        assert_eq!(names(&board), vec!["CAA", "Octagon"]);
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("asc".parse::<SortOrder>(), Ok(SortOrder::Ascending));
        assert_eq!("Descending".parse::<SortOrder>(), Ok(SortOrder::Descending));
        assert!("up".parse::<SortOrder>().is_err());
    }
}
