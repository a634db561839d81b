//! Display-name normalization.
//!
//! The player worksheet builds names by joining separate first/last name
//! columns, which mangles hyphenated and particle surnames. A static
//! correction table (plus operator overrides from config) maps the known
//! artifacts back to the names people expect to see.

use std::collections::HashMap;

/// Known malformed names and their corrected display form.
const CORRECTIONS: &[(&str, &str)] = &[
    ("Zach Aston Reese", "Zach Aston-Reese"),
    ("Pierre Luc Dubois", "Pierre-Luc Dubois"),
    ("Jean Gabriel Pageau", "Jean-Gabriel Pageau"),
    ("Oliver Ekman Larsson", "Oliver Ekman-Larsson"),
    ("Marc Andre Fleury", "Marc-Andre Fleury"),
    ("Pierre Edouard Bellemare", "Pierre-Edouard Bellemare"),
    ("Ryan Nugent Hopkins", "Ryan Nugent-Hopkins"),
    ("James Van Riemsdyk", "James van Riemsdyk"),
    ("Trevor Van Riemsdyk", "Trevor van Riemsdyk"),
];

/// Applies the correction table to raw names.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    corrections: HashMap<String, String>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl NameNormalizer {
    /// Build a normalizer from the static table plus `overrides`.
    /// Overrides win when both define the same malformed name.
    pub fn new(overrides: &HashMap<String, String>) -> Self {
        let mut corrections: HashMap<String, String> = CORRECTIONS
            .iter()
            .map(|(from, to)| (name_key(from), to.to_string()))
            .collect();
        for (from, to) in overrides {
            corrections.insert(name_key(from), collapse_whitespace(to));
        }
        Self { corrections }
    }

    /// Normalize a raw worksheet name for display.
    pub fn display_name(&self, raw: &str) -> String {
        let collapsed = collapse_whitespace(raw);
        let reordered = reorder_last_first(&collapsed).unwrap_or(collapsed);
        match self.corrections.get(&reordered.to_lowercase()) {
            Some(fixed) => fixed.clone(),
            None => reordered,
        }
    }

    /// Normalize an organization name. Commas are part of agency names
    /// ("Newport Sports Management, Inc."), so no reordering happens.
    pub fn display_org(&self, raw: &str) -> String {
        let collapsed = collapse_whitespace(raw);
        match self.corrections.get(&collapsed.to_lowercase()) {
            Some(fixed) => fixed.clone(),
            None => collapsed,
        }
    }

    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Lookup key for a name: whitespace-collapsed and lowercased.
pub fn name_key(raw: &str) -> String {
    collapse_whitespace(raw).to_lowercase()
}

/// Trim and collapse runs of whitespace to single spaces.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"Last, First"` -> `"First Last"`. Returns `None` when there is no
/// single comma to split on.
fn reorder_last_first(name: &str) -> Option<String> {
    let (last, first) = name.split_once(',')?;
    if first.contains(',') {
        return None;
    }
    let (last, first) = (last.trim(), first.trim());
    if last.is_empty() || first.is_empty() {
        return None;
    }
    Some(format!("{} {}", first, last))
}
