// 📄 Spreadsheet Reader - first worksheet (or CSV) → raw header + cells
// No interpretation here: the normalizer decides what each cell means.

use crate::error::DashboardError;
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Extensions the reader understands, lowercase
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["xlsx", "xlsm", "xls", "xlsb", "ods", "csv"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl RawCell {
    /// Empty or whitespace-only
    pub fn is_blank(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Header row plus the data rows below it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read the first worksheet of `path`, headers taken from the 0-based sheet row `header_row`.
/// For CSV sources empty lines are not counted.
pub fn read_sheet(path: &Path, header_row: usize) -> Result<RawSheet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let grid = if ext == "csv" {
        read_csv_grid(path)?
    } else {
        read_workbook_grid(path)?
    };

    split_header(path, grid, header_row)
}

fn split_header(path: &Path, grid: Vec<Vec<RawCell>>, header_row: usize) -> Result<RawSheet> {
    let mut rows = grid.into_iter().skip(header_row);
    let header = rows.next().ok_or_else(|| DashboardError::Parse {
        path: path.to_path_buf(),
        reason: format!("header row {} not found", header_row + 1),
    })?;

    let headers: Vec<String> = header
        .iter()
        .map(|c| match c {
            RawCell::Text(s) => s.trim_start_matches('\u{feff}').trim().to_string(),
            RawCell::Empty => String::new(),
            other => crate::normalizer::cell_text(other).unwrap_or_default(),
        })
        .collect();

    let rows = rows
        .filter(|r| !r.iter().all(RawCell::is_blank))
        .collect();

    Ok(RawSheet { headers, rows })
}

// ============================================================================
// WORKBOOKS (calamine)
// ============================================================================

fn read_workbook_grid(path: &Path) -> Result<Vec<Vec<RawCell>>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| DashboardError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DashboardError::Parse {
            path: path.to_path_buf(),
            reason: "workbook has no worksheets".to_string(),
        })?
        .map_err(|e| DashboardError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    // The used range may not start at A1; pad so row indices are sheet rows
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut grid: Vec<Vec<RawCell>> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![RawCell::Empty; start_col as usize];
        cells.extend(row.iter().map(convert_cell));
        grid.push(cells);
    }
    Ok(grid)
}

fn convert_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty | Data::Error(_) => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Int(n) => RawCell::Number(*n as f64),
        Data::Float(f) => RawCell::Number(*f),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(dt) => excel_datetime(dt.as_f64())
            .map(RawCell::DateTime)
            .unwrap_or(RawCell::Empty),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
    }
}

/// Excel serial (days since 1899-12-30, fraction = time of day) → datetime
fn excel_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

// ============================================================================
// CSV
// ============================================================================

/// UTF-8 when valid, otherwise Latin-1 (older accounting exports)
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// `;` when the first non-empty line has more semicolons than commas
fn sniff_delimiter(content: &[u8]) -> u8 {
    let first = content
        .split(|&b| b == b'\n')
        .find(|line| line.iter().any(|b| !b.is_ascii_whitespace()))
        .unwrap_or(&[]);
    let semicolons = first.iter().filter(|&&b| b == b';').count();
    let commas = first.iter().filter(|&&b| b == b',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn read_csv_grid(path: &Path) -> Result<Vec<Vec<RawCell>>> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(&content))
        .from_reader(content.as_slice());

    let mut grid = Vec::new();
    for (i, record) in rdr.byte_records().enumerate() {
        let record = record.map_err(|e| DashboardError::Parse {
            path: path.to_path_buf(),
            reason: format!("line {}: {}", i + 1, e),
        })?;
        let cells = record
            .iter()
            .map(|field| {
                let text = decode_field(field);
                if text.trim().is_empty() {
                    RawCell::Empty
                } else {
                    RawCell::Text(text)
                }
            })
            .collect();
        grid.push(cells);
    }
    Ok(grid)
}

// ============================================================================
// TESTS
// ============================================================================
