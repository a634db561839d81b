//! Deterministic entity IDs derived from normalized names.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use chrono::NaiveDate;

use crate::names::name_key;

/// Hex characters kept from the digest.
const ID_LEN: usize = 16;

/// A short, URL-safe ID. The same name always maps to the same ID, so
/// links stay valid across workbook reloads.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    fn digest(kind: &str, parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        for part in parts {
            hasher.update(b"|");
            hasher.update(name_key(part).as_bytes());
        }
        let hash = hex::encode(hasher.finalize());
        Self(hash[..ID_LEN].to_string())
    }

    pub fn agent(name: &str) -> Self {
        Self::digest("agent", &[name])
    }

    pub fn agency(name: &str) -> Self {
        Self::digest("agency", &[name])
    }

    /// Players are keyed by name, birth date and agent, since names alone
    /// collide across the league.
    pub fn player(name: &str, birth_date: Option<NaiveDate>, agent_name: &str) -> Self {
        let born = birth_date.map(|d| d.to_string()).unwrap_or_default();
        Self::digest("player", &[name, &born, agent_name])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `raw` could be an ID rather than a name.
    pub fn looks_like_id(raw: &str) -> bool {
        raw.len() == ID_LEN && raw.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}
