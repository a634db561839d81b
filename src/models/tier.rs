//! Classification of agents and agencies by how much of their clients'
//! on-ice value they turn into pay.

use serde::{Deserialize, Serialize};

/// Classification bucket based on capture index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTier {
    Premium,
    AboveMarket,
    AtMarket,
    BelowMarket,
    Unrated,
}

impl ValueTier {
    pub const ALL: [ValueTier; 5] = [
        ValueTier::Premium,
        ValueTier::AboveMarket,
        ValueTier::AtMarket,
        ValueTier::BelowMarket,
        ValueTier::Unrated,
    ];

    /// Classify a capture index (compensation / on-ice value).
    pub fn from_capture_index(capture_index: Option<f64>) -> Self {
        match capture_index {
            Some(c) if c >= 1.10 => ValueTier::Premium,
            Some(c) if c >= 1.00 => ValueTier::AboveMarket,
            Some(c) if c >= 0.90 => ValueTier::AtMarket,
            Some(_) => ValueTier::BelowMarket,
            None => ValueTier::Unrated,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ValueTier::Premium => "Clients paid at least 110% of their on-ice value",
            ValueTier::AboveMarket => "Clients paid between 100% and 110% of their on-ice value",
            ValueTier::AtMarket => "Clients paid between 90% and 100% of their on-ice value",
            ValueTier::BelowMarket => "Clients paid less than 90% of their on-ice value",
            ValueTier::Unrated => "Not enough on-ice value data to classify",
        }
    }
}

impl std::fmt::Display for ValueTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueTier::Premium => write!(f, "Premium"),
            ValueTier::AboveMarket => write!(f, "Above Market"),
            ValueTier::AtMarket => write!(f, "At Market"),
            ValueTier::BelowMarket => write!(f, "Below Market"),
            ValueTier::Unrated => write!(f, "Unrated"),
        }
    }
}
