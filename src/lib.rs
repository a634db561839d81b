//! # Agent Dashboard
//!
//! Value-capture metrics for hockey player agents and agencies, computed
//! from a contract workbook and served as a JSON API.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (seasons, player records, summaries)
//! - **workbook**: Worksheet reading and column mapping
//! - **source**: Where the workbook bytes come from (HTTP, file, memory)
//! - **fetch**: HTTP downloads with an on-disk cache
//! - **dataset**: The loaded dataset and its process-wide cache
//! - **calculate**: Capture percentages, trends and client breakdowns
//! - **leaderboard**: Sorting, filtering and exclusions
//! - **names**: Display-name normalization
//! - **headshots**: Player image lookup
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod calculate;
pub mod config;
pub mod dataset;
pub mod fetch;
pub mod headshots;
pub mod leaderboard;
pub mod models;
pub mod names;
pub mod source;
pub mod workbook;

pub use models::*;

use std::time::Duration;

/// Parse a human-friendly duration string (e.g., "1d", "6h", "30m", "90s").
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('d') {
        (n, 86400)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        // Default to seconds
        (s, 1)
    };

    let num: u64 = num_str.trim().parse().ok()?;
    num.checked_mul(multiplier).map(Duration::from_secs)
}
