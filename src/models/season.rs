//! Hockey seasons and per-season contract lines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A season, identified by the calendar year it starts in.
/// Serialized as its display label, e.g. `"2018-19"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Season(u16);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid season: {0:?} (expected e.g. 2018-19)")]
pub struct SeasonParseError(String);

impl Season {
    pub const fn new(start_year: u16) -> Self {
        Self(start_year)
    }

    pub fn start_year(&self) -> u16 {
        self.0
    }

    /// Label used in worksheet headers and the UI, e.g. `"2018-19"`.
    pub fn label(&self) -> String {
        format!("{}-{:02}", self.0, (self.0 + 1) % 100)
    }

    /// Long label, e.g. `"2018-2019"`.
    pub fn long_label(&self) -> String {
        format!("{}-{}", self.0, self.0 + 1)
    }
}

/// The six seasons covered by the contract workbook.
pub fn default_seasons() -> Vec<Season> {
    (2018..=2023).map(Season::new).collect()
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Season {
    type Err = SeasonParseError;

    /// Accepts `2018`, `2018-19`, `2018-2019` and `20182019`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SeasonParseError(s.to_string());
        let trimmed = s.trim();
        if !trimmed.chars().all(|c| c.is_ascii_digit() || c == '-') {
            return Err(err());
        }
        let (head, tail) = match trimmed.split_once('-') {
            Some((head, tail)) if !tail.is_empty() => (head, tail),
            Some(_) => return Err(err()),
            None if trimmed.len() == 8 => trimmed.split_at(4),
            None => (trimmed, ""),
        };
        if head.len() != 4 {
            return Err(err());
        }
        let start: u16 = head.parse().map_err(|_| err())?;
        let valid_end = match tail.len() {
            0 => true,
            2 => tail == format!("{:02}", (start + 1) % 100),
            4 => tail == (start + 1).to_string(),
            _ => false,
        };
        if !valid_end {
            return Err(err());
        }
        Ok(Season(start))
    }
}

impl From<Season> for String {
    fn from(season: Season) -> Self {
        season.label()
    }
}

impl TryFrom<String> for Season {
    type Error = SeasonParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One season of a player contract: what the player cost and the on-ice
/// value (player contribution) they delivered. Either side may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonLine {
    pub cost: Option<f64>,
    pub value: Option<f64>,
}

impl SeasonLine {
    pub fn new(cost: Option<f64>, value: Option<f64>) -> Self {
        Self { cost, value }
    }

    pub fn is_empty(&self) -> bool {
        self.cost.is_none() && self.value.is_none()
    }
}
