//! Workbook parsing.
//!
//! Turns the downloaded xlsx bytes into named [`Table`]s of loosely typed
//! [`Cell`]s, then into typed models (see [`sheets`]). Columns are located
//! by header text, so column order in the workbook does not matter.

pub mod sheets;

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
use chrono::{Days, NaiveDate};
use thiserror::Error;
use tracing::debug;

use crate::names::name_key;

/// Errors raised while reading a workbook.
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("Failed to open workbook: {0}")]
    Open(#[from] calamine::XlsxError),

    #[error("Worksheet not found: {0}")]
    MissingSheet(String),

    #[error("Worksheet {sheet} has no {column} column")]
    MissingColumn { sheet: String, column: String },
}

/// A single worksheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    /// Numeric value. Text is parsed after stripping currency symbols,
    /// thousands separators and a trailing `%` (which divides by 100).
    /// Anything else, including NaN, is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// Non-negative numeric value.
    pub fn as_non_negative(&self) -> Option<f64> {
        self.as_f64().filter(|v| *v >= 0.0)
    }

    /// Whole, non-negative count.
    pub fn as_count(&self) -> Option<u32> {
        self.as_non_negative()
            .filter(|v| *v <= u32::MAX as f64)
            .map(|v| v.round() as u32)
    }

    /// Trimmed, non-empty text. Numbers are rendered without a trailing `.0`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Empty => None,
        }
    }

    /// A date from an Excel serial number or ISO / US formatted text.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Number(n) if n.is_finite() && *n >= 1.0 => {
                let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
                epoch.checked_add_days(Days::new(n.floor() as u64))
            }
            Cell::Text(s) => {
                let t = s.trim();
                let t = t.split(['T', ' ']).next().unwrap_or(t);
                NaiveDate::parse_from_str(t, "%Y-%m-%d")
                    .or_else(|_| NaiveDate::parse_from_str(t, "%m/%d/%Y"))
                    .ok()
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            _ => Cell::Empty,
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let t = raw.trim();
    let (t, scale) = match t.strip_suffix('%') {
        Some(rest) => (rest, 0.01),
        None => (t, 1.0),
    };
    let negative = t.starts_with('(') && t.ends_with(')');
    let cleaned: String = t
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '(' | ')'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let n: f64 = cleaned.parse().ok()?;
    let n = if negative { -n } else { n };
    n.is_finite().then_some(n * scale)
}

/// One worksheet: a header row followed by data rows.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Build a table from a calamine range. The first non-empty row is the
    /// header; fully empty rows after it are dropped.
    pub fn from_range(name: &str, range: &Range<Data>) -> Self {
        let mut rows = range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect::<Vec<_>>())
            .skip_while(|row| row.iter().all(Cell::is_empty));

        let headers = rows
            .next()
            .map(|row| {
                row.iter()
                    .map(|c| c.as_text().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        let rows = rows.filter(|row| !row.iter().all(Cell::is_empty)).collect();
        Self::new(name, headers, rows)
    }

    /// Index of the first header matching any alias (case and spacing
    /// insensitive).
    pub fn column(&self, aliases: &[&str]) -> Option<usize> {
        let keys: Vec<String> = self.headers.iter().map(|h| name_key(h)).collect();
        aliases.iter().find_map(|alias| {
            let alias = name_key(alias);
            keys.iter().position(|k| *k == alias)
        })
    }

    /// Like [`Table::column`], but a missing column is an error.
    pub fn require_column(&self, label: &str, aliases: &[&str]) -> Result<usize, WorkbookError> {
        self.column(aliases).ok_or_else(|| WorkbookError::MissingColumn {
            sheet: self.name.clone(),
            column: label.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cell at `col` in `row`, treating short rows as empty.
pub fn cell(row: &[Cell], col: Option<usize>) -> &Cell {
    const EMPTY: &Cell = &Cell::Empty;
    col.and_then(|c| row.get(c)).unwrap_or(EMPTY)
}

/// All worksheets of a workbook, keyed by lowercased sheet name.
#[derive(Debug, Default)]
pub struct Workbook {
    tables: HashMap<String, Table>,
}

impl Workbook {
    /// Parse xlsx bytes. A file that is not a valid xlsx (zip) archive
    /// fails with [`WorkbookError::Open`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkbookError> {
        let mut xlsx: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
        let mut tables = HashMap::new();
        for sheet in xlsx.sheet_names() {
            let range = xlsx.worksheet_range(&sheet)?;
            let table = Table::from_range(&sheet, &range);
            debug!("Read worksheet {} ({} rows)", sheet, table.len());
            tables.insert(name_key(&sheet), table);
        }
        Ok(Self { tables })
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name_key(name))
    }

    pub fn require_table(&self, name: &str) -> Result<&Table, WorkbookError> {
        self.table(name)
            .ok_or_else(|| WorkbookError::MissingSheet(name.to_string()))
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.values().map(|t| t.name.as_str()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_numbers() {
        assert_eq!(Cell::Number(1.5).as_f64(), Some(1.5));
        assert_eq!(Cell::Number(f64::NAN).as_f64(), None);
        assert_eq!(Cell::Text("$1,250,000".into()).as_f64(), Some(1_250_000.0));
        assert_eq!(Cell::Text("93.75%".into()).as_f64(), Some(0.9375));
        assert_eq!(Cell::Text("(500)".into()).as_f64(), Some(-500.0));
        assert_eq!(Cell::Text("n/a".into()).as_f64(), None);
        assert_eq!(Cell::Text("".into()).as_f64(), None);
        assert_eq!(Cell::Empty.as_f64(), None);
        assert_eq!(Cell::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_cell_non_negative_and_count() {
        assert_eq!(Cell::Number(-1.0).as_non_negative(), None);
        assert_eq!(Cell::Number(0.0).as_non_negative(), Some(0.0));
        assert_eq!(Cell::Number(12.0).as_count(), Some(12));
        assert_eq!(Cell::Text("7".into()).as_count(), Some(7));
        assert_eq!(Cell::Number(-3.0).as_count(), None);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(Cell::Text("  Pat  ".into()).as_text(), Some("Pat".into()));
        assert_eq!(Cell::Text("   ".into()).as_text(), None);
        assert_eq!(Cell::Number(42.0).as_text(), Some("42".into()));
        assert_eq!(Cell::Empty.as_text(), None);
    }

    #[test]
    fn test_cell_dates() {
        let d = NaiveDate::from_ymd_opt(1997, 1, 13).unwrap();
        // Excel serial for 1997-01-13
        assert_eq!(Cell::Number(35443.0).as_date(), Some(d));
        assert_eq!(Cell::Text("1997-01-13".into()).as_date(), Some(d));
        assert_eq!(Cell::Text("1997-01-13T00:00:00".into()).as_date(), Some(d));
        assert_eq!(Cell::Text("01/13/1997".into()).as_date(), Some(d));
        assert_eq!(Cell::Text("soon".into()).as_date(), None);
    }

    #[test]
    fn test_table_column_aliases() {
        let t = Table::new(
            "Agents",
            vec!["Agent  Name".into(), "won%".into()],
            vec![],
        );
        assert_eq!(t.column(&["Agent Name"]), Some(0));
        assert_eq!(t.column(&["Win %", "Won%"]), Some(1));
        assert_eq!(t.column(&["CT"]), None);
        assert!(matches!(
            t.require_column("contracts tracked", &["CT"]),
            Err(WorkbookError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_cell_helper_short_rows() {
        let row = vec![Cell::Number(1.0)];
        assert_eq!(cell(&row, Some(0)), &Cell::Number(1.0));
        assert_eq!(cell(&row, Some(5)), &Cell::Empty);
        assert_eq!(cell(&row, None), &Cell::Empty);
    }

    #[test]
    fn test_invalid_bytes_fail_to_open() {
        let err = Workbook::from_bytes(b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, WorkbookError::Open(_)));
    }

    #[test]
    fn test_from_bytes_reads_sheets() {
        let mut wb = rust_xlsxwriter::Workbook::new();
        let sheet = wb.add_worksheet();
        sheet.set_name("Agents").unwrap();
        sheet.write_string(1, 0, "Agent Name").unwrap();
        sheet.write_string(1, 1, "CT").unwrap();
        sheet.write_string(2, 0, "Pat Brisson").unwrap();
        sheet.write_number(2, 1, 12.0).unwrap();
        let bytes = wb.save_to_buffer().unwrap();

        let workbook = Workbook::from_bytes(&bytes).unwrap();
        let table = workbook.table("agents").unwrap();
        assert_eq!(table.headers, vec!["Agent Name", "CT"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0][1], Cell::Number(12.0));
        assert_eq!(workbook.sheet_names(), vec!["Agents"]);
        assert!(workbook.require_table("PIBA").is_err());
    }
}
