// 🧹 Column Normalizer - raw spreadsheet cells → canonical typed columns
// Bad cells become null and get counted; cell content never aborts a file.

use crate::domain::{ColumnKind, Domain, DomainSchema, HeaderStyle};
use crate::error::DashboardError;
use crate::spreadsheet::{RawCell, RawSheet};
use crate::table::{ColumnValues, Table};
use anyhow::Result;
use chrono::{Days, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// OPTIONS & REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Apply the domain's composite-key deduplication (if it has one)
    pub deduplicate: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions { deduplicate: true }
    }
}

impl NormalizeOptions {
    /// Every combination a snapshot can be built with
    pub const ALL: [NormalizeOptions; 2] = [
        NormalizeOptions { deduplicate: true },
        NormalizeOptions { deduplicate: false },
    ];

    /// Short label used in snapshot file names
    pub fn tag(&self) -> &'static str {
        if self.deduplicate {
            "dedup"
        } else {
            "raw"
        }
    }
}

/// What the normalizer had to fix or could not fix in one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub missing_columns: Vec<String>,
    /// Non-empty cells that did not parse as a date, per column
    pub invalid_dates: BTreeMap<String, usize>,
    /// Non-empty cells that did not parse as a number, per column
    pub invalid_numbers: BTreeMap<String, usize>,
    /// Negative values dropped from money columns, per column
    pub negative_money: BTreeMap<String, usize>,
    pub duplicates_removed: usize,
}

impl NormalizeReport {
    /// Schema warning for the page banner, if any expected column is absent
    pub fn schema_error(&self, domain: Domain) -> Option<DashboardError> {
        if self.missing_columns.is_empty() {
            return None;
        }
        Some(DashboardError::Schema {
            domain,
            columns: self.missing_columns.clone(),
        })
    }

    /// No column or cell problems; removed duplicates do not count
    pub fn is_clean(&self) -> bool {
        self.missing_columns.is_empty()
            && self.invalid_dates.is_empty()
            && self.invalid_numbers.is_empty()
            && self.negative_money.is_empty()
    }
}

/// Canonical table plus the report it was produced with. This is what gets cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTable {
    pub table: Table,
    pub report: NormalizeReport,
}

// ============================================================================
// HEADERS
// ============================================================================

pub fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Comparison key for headers: no accents, uppercase, alphanumerics only.
/// "Razón Social" and "RAZON_SOCIAL" fold to the same key.
pub fn fold_key(header: &str) -> String {
    strip_accents(header)
        .to_uppercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// "Centro de Costo " → "CENTRO_DE_COSTO"
pub fn upper_snake(header: &str) -> String {
    let mut out = String::new();
    let mut pending_sep = false;
    for c in strip_accents(header.trim()).to_uppercase().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Map raw headers to canonical column names.
///
/// Each schema column claims the first unclaimed header matching its name,
/// then its aliases in order. Leftover headers follow the domain's header style.
pub fn canonical_headers(raw: &[String], schema: &DomainSchema) -> Vec<String> {
    let folded: Vec<String> = raw.iter().map(|h| fold_key(h)).collect();
    let mut names: Vec<Option<String>> = vec![None; raw.len()];

    for spec in schema.columns {
        let candidates = std::iter::once(spec.name).chain(spec.aliases.iter().copied());
        for candidate in candidates {
            let key = fold_key(candidate);
            let hit = (0..raw.len()).find(|&i| names[i].is_none() && folded[i] == key);
            if let Some(i) = hit {
                if raw[i].trim() != spec.name {
                    debug!("{}: header '{}' → '{}'", schema.domain, raw[i].trim(), spec.name);
                }
                names[i] = Some(spec.name.to_string());
                break;
            }
        }
    }

    let mut used: Vec<String> = Vec::with_capacity(raw.len());
    for (i, name) in names.into_iter().enumerate() {
        let base = name.unwrap_or_else(|| {
            let styled = match schema.header_style {
                HeaderStyle::Trimmed => raw[i].trim().to_string(),
                HeaderStyle::UpperSnake => upper_snake(&raw[i]),
            };
            if styled.is_empty() {
                format!("COLUMNA_{}", i + 1)
            } else {
                styled
            }
        });

        let mut unique = base.clone();
        let mut n = 2;
        while used.contains(&unique) {
            unique = format!("{}_{}", base, n);
            n += 1;
        }
        used.push(unique);
    }
    used
}

// ============================================================================
// CELL CLEANING
// ============================================================================

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d/%m/%y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M:%S %p",
];

/// Parse a date written as text. Day-first for slash/dash formats
/// (the exports come from Colombian systems).
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    None
}

/// Excel serial day number (1900 date system) → calendar date
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // Serial 1 is 1900-01-01; Excel's phantom 1900-02-29 shifts the epoch to 1899-12-30
    if !serial.is_finite() || !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

pub fn parse_date(cell: &RawCell) -> Option<NaiveDate> {
    match cell {
        RawCell::DateTime(dt) => Some(dt.date()),
        RawCell::Number(n) => excel_serial_to_date(*n),
        RawCell::Text(s) => parse_date_str(s),
        RawCell::Bool(_) | RawCell::Empty => None,
    }
}

/// Strip currency symbols, thousands separators and spaces, then parse.
/// "$ 1,234,567.50" → 1234567.5
pub fn clean_number_str(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_start_matches("COP")
        .trim_end_matches("COP")
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn clean_number(cell: &RawCell) -> Option<f64> {
    match cell {
        RawCell::Number(n) => Some(*n).filter(|n| n.is_finite()),
        RawCell::Text(s) => clean_number_str(s),
        RawCell::Bool(_) | RawCell::DateTime(_) | RawCell::Empty => None,
    }
}

/// Text form of any cell; integral numbers lose their ".0" (account numbers, plates)
pub fn cell_text(cell: &RawCell) -> Option<String> {
    match cell {
        RawCell::Empty => None,
        RawCell::Text(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        RawCell::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                Some(format!("{}", *n as i64))
            } else {
                Some(n.to_string())
            }
        }
        RawCell::Bool(b) => Some(b.to_string()),
        RawCell::DateTime(dt) => {
            if dt.time() == chrono::NaiveTime::MIN {
                Some(dt.date().format("%Y-%m-%d").to_string())
            } else {
                Some(dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }
        }
    }
}

// ============================================================================
// NORMALIZE
// ============================================================================

/// Convert a raw sheet into the domain's canonical table
pub fn normalize(
    sheet: &RawSheet,
    schema: &DomainSchema,
    options: &NormalizeOptions,
) -> Result<NormalizedTable> {
    let headers = canonical_headers(&sheet.headers, schema);
    let mut table = Table::new(sheet.rows.len());
    let mut report = NormalizeReport::default();
    let empty = RawCell::Empty;

    for (ci, name) in headers.iter().enumerate() {
        let kind = schema.spec(name).map(|s| s.kind).unwrap_or(ColumnKind::Text);
        let cells = sheet.rows.iter().map(|row| row.get(ci).unwrap_or(&empty));

        let values = match kind {
            ColumnKind::Text => ColumnValues::Text(cells.map(cell_text).collect()),
            ColumnKind::Date => {
                let mut invalid = 0usize;
                let dates = cells
                    .map(|c| {
                        let d = parse_date(c);
                        if d.is_none() && !c.is_blank() {
                            invalid += 1;
                        }
                        d
                    })
                    .collect();
                if invalid > 0 {
                    report.invalid_dates.insert(name.clone(), invalid);
                }
                ColumnValues::Date(dates)
            }
            ColumnKind::Money | ColumnKind::Number => {
                let mut invalid = 0usize;
                let mut negative = 0usize;
                let numbers = cells
                    .map(|c| {
                        let mut n = clean_number(c);
                        if n.is_none() && !c.is_blank() {
                            invalid += 1;
                        }
                        if kind == ColumnKind::Money && n.map(|v| v < 0.0).unwrap_or(false) {
                            negative += 1;
                            n = None;
                        }
                        // -0.0 would break byte-identical snapshots
                        let n = n.map(|v| if v == 0.0 { 0.0 } else { v });
                        if schema.fill_missing_numbers {
                            Some(n.unwrap_or(0.0))
                        } else {
                            n
                        }
                    })
                    .collect();
                if invalid > 0 {
                    report.invalid_numbers.insert(name.clone(), invalid);
                }
                if negative > 0 {
                    report.negative_money.insert(name.clone(), negative);
                }
                ColumnValues::Number(numbers)
            }
        };

        table.push_column(name.clone(), values)?;
    }

    report.missing_columns = schema
        .required_columns()
        .filter(|c| !table.has_column(c))
        .map(String::from)
        .collect();
    if !report.missing_columns.is_empty() {
        warn!(
            "⚠️  {}: expected columns missing: {}",
            schema.domain,
            report.missing_columns.join(", ")
        );
    }

    if options.deduplicate && !schema.dedup_key.is_empty() {
        let absent: Vec<&str> = schema
            .dedup_key
            .iter()
            .copied()
            .filter(|c| !table.has_column(c))
            .collect();

        if absent.is_empty() {
            let update_col = find_update_column(&table, schema.update_date_hints);
            let before = table.len();
            let (deduped, removed) = deduplicate(&table, schema.dedup_key, update_col.as_deref());
            if removed > 0 {
                info!(
                    "🔍 {}: removed {} duplicate rows ({} → {}) by {}",
                    schema.domain,
                    removed,
                    before,
                    deduped.len(),
                    schema.dedup_key.join(" + ")
                );
            }
            table = deduped;
            report.duplicates_removed = removed;
        } else {
            warn!(
                "⚠️  {}: deduplication skipped, missing key columns: {}",
                schema.domain,
                absent.join(", ")
            );
        }
    }

    Ok(NormalizedTable { table, report })
}

// ============================================================================
// DEDUPLICATION
// ============================================================================

/// First column whose lowercase name contains one of the hints
fn find_update_column(table: &Table, hints: &[&str]) -> Option<String> {
    table
        .column_names()
        .into_iter()
        .find(|name| {
            let lower = name.to_lowercase();
            hints.iter().any(|h| lower.contains(h))
        })
        .map(String::from)
}

fn key_part(table: &Table, column: &str, row: usize) -> String {
    match table.column(column) {
        Some(col) => match &col.values {
            ColumnValues::Text(v) => v[row]
                .as_deref()
                .map(|s| s.trim().to_uppercase())
                .unwrap_or_default(),
            other => other.display(row).unwrap_or_default(),
        },
        None => String::new(),
    }
}

/// Remove rows repeating the composite key. The first occurrence is kept,
/// unless `update_column` is given: then the row with the latest update date
/// wins (ties keep the first). Surviving rows keep their original order.
///
/// Returns the deduplicated table and the number of rows removed.
pub fn deduplicate(table: &Table, key: &[&str], update_column: Option<&str>) -> (Table, usize) {
    let updated: Option<Vec<Option<NaiveDate>>> = update_column.and_then(|name| {
        if let Some(d) = table.dates(name) {
            return Some(d.to_vec());
        }
        table
            .text(name)
            .map(|v| v.iter().map(|s| s.as_deref().and_then(parse_date_str)).collect())
    });

    let mut kept: HashMap<String, usize> = HashMap::new();
    for row in 0..table.len() {
        let k: Vec<String> = key.iter().map(|c| key_part(table, c, row)).collect();
        let k = k.join("\u{1f}");
        match kept.get(&k) {
            None => {
                kept.insert(k, row);
            }
            Some(&prev) => {
                if let Some(dates) = &updated {
                    let newer = match (dates[row], dates[prev]) {
                        (Some(a), Some(b)) => a > b,
                        (Some(_), None) => true,
                        _ => false,
                    };
                    if newer {
                        kept.insert(k, row);
                    }
                }
            }
        }
    }

    let mut rows: Vec<usize> = kept.into_values().collect();
    rows.sort_unstable();
    let removed = table.len() - rows.len();
    (table.select_rows(&rows), removed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn sheet(headers: &[&str], rows: Vec<Vec<RawCell>>) -> RawSheet {
        RawSheet {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn test_fold_key_ignores_accents_case_and_separators() {
        assert_eq!(fold_key("Razón Social"), "RAZONSOCIAL");
        assert_eq!(fold_key("razon_social"), "RAZONSOCIAL");
        assert_eq!(fold_key(" AÑO "), "ANO");
    }

    #[test]
    fn test_upper_snake() {
        assert_eq!(upper_snake("Centro de Costo "), "CENTRO_DE_COSTO");
        assert_eq!(upper_snake("Modalidad  Venta"), "MODALIDAD_VENTA");
        assert_eq!(upper_snake("Estación"), "ESTACION");
        assert_eq!(upper_snake("  "), "");
    }

    #[test]
    fn test_canonical_headers_cartera_aliases() {
        let schema = Domain::Cartera.schema();
        let raw: Vec<String> = [" Cuenta", "Razón Social", "Cliente", "PLACA", "Total Cuota ", "", "Notas"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let headers = canonical_headers(&raw, &schema);
        assert_eq!(
            headers,
            vec!["Cuenta", "Razon Social", "Cliente", "Placa", "Total Cuota", "COLUMNA_6", "Notas"]
        );
    }

    #[test]
    fn test_canonical_headers_upper_snake_and_duplicates() {
        let schema = Domain::Colocacion.schema();
        let raw: Vec<String> = ["TotalFac", "Año", "Vendedor", "vendedor", "Centro de Costo"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let headers = canonical_headers(&raw, &schema);
        assert_eq!(
            headers,
            vec!["TOTALFAC", "ANIO", "VENDEDOR", "VENDEDOR_2", "CENTRO_COSTO"]
        );
    }

    #[test]
    fn test_parse_date_tolerant_formats() {
        let oct5 = NaiveDate::from_ymd_opt(2024, 10, 5);
        assert_eq!(parse_date_str("2024-10-05"), oct5);
        assert_eq!(parse_date_str("05/10/2024"), oct5);
        assert_eq!(parse_date_str("05-10-2024"), oct5);
        assert_eq!(parse_date_str("2024/10/05"), oct5);
        assert_eq!(parse_date_str("2024-10-05 14:30:00"), oct5);
        assert_eq!(parse_date_str("05/10/2024 08:15"), oct5);
        assert_eq!(parse_date_str("31/02/2024"), None);
        assert_eq!(parse_date_str("pendiente"), None);
        assert_eq!(parse_date_str("  "), None);
    }

    #[test]
    fn test_excel_serial_dates() {
        assert_eq!(excel_serial_to_date(45570.0), NaiveDate::from_ymd_opt(2024, 10, 5));
        assert_eq!(excel_serial_to_date(45570.75), NaiveDate::from_ymd_opt(2024, 10, 5));
        assert_eq!(excel_serial_to_date(0.0), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_clean_number_strips_currency_and_separators() {
        assert_eq!(clean_number_str("$1,234,567.50"), Some(1_234_567.5));
        assert_eq!(clean_number_str(" $ 200 "), Some(200.0));
        assert_eq!(clean_number_str("COP 1,000"), Some(1000.0));
        assert_eq!(clean_number_str("1\u{a0}500"), Some(1500.0));
        assert_eq!(clean_number_str("-45"), Some(-45.0));
        assert_eq!(clean_number_str("N/A"), None);
        assert_eq!(clean_number_str("NaN"), None);
        assert_eq!(clean_number_str(""), None);
    }

    #[test]
    fn test_cell_text_formats_integral_numbers() {
        assert_eq!(cell_text(&RawCell::Number(137010001.0)), Some("137010001".into()));
        assert_eq!(cell_text(&RawCell::Number(12.5)), Some("12.5".into()));
        assert_eq!(cell_text(&text("  ABC123 ")), Some("ABC123".into()));
        assert_eq!(cell_text(&text("   ")), None);
    }

    #[test]
    fn test_normalize_money_non_negative_and_dates_valid_or_null() {
        let schema = Domain::Recaudo.schema();
        let s = sheet(
            &["FECHA_RECAUDO", "POR_VENCER", "TREINTA_DIAS", "DIAS_VENCIDOS"],
            vec![
                vec![text("2024-10-01"), text("$1,000"), text("-50"), text("-3")],
                vec![text("no aplica"), text("abc"), RawCell::Number(25.0), RawCell::Number(45.0)],
                vec![RawCell::Empty, RawCell::Empty, text("$ 0"), RawCell::Empty],
            ],
        );

        let out = normalize(&s, &schema, &NormalizeOptions::default()).unwrap();
        let t = &out.table;

        for col in ["POR_VENCER", "TREINTA_DIAS"] {
            for v in t.numbers(col).unwrap().iter().flatten() {
                assert!(*v >= 0.0, "{} has negative value {}", col, v);
            }
        }
        assert_eq!(t.numbers("POR_VENCER").unwrap(), &[Some(1000.0), None, None]);
        assert_eq!(t.numbers("TREINTA_DIAS").unwrap(), &[None, Some(25.0), Some(0.0)]);
        // Days overdue are plain numbers and may be negative
        assert_eq!(t.numbers("DIAS_VENCIDOS").unwrap(), &[Some(-3.0), Some(45.0), None]);
        assert_eq!(
            t.dates("FECHA_RECAUDO").unwrap(),
            &[NaiveDate::from_ymd_opt(2024, 10, 1), None, None]
        );

        assert_eq!(out.report.invalid_dates.get("FECHA_RECAUDO"), Some(&1));
        assert_eq!(out.report.invalid_numbers.get("POR_VENCER"), Some(&1));
        assert_eq!(out.report.negative_money.get("TREINTA_DIAS"), Some(&1));
        assert!(!out.report.is_clean());
    }

    #[test]
    fn test_report_is_clean_ignores_removed_duplicates() {
        let mut report = NormalizeReport {
            duplicates_removed: 3,
            ..NormalizeReport::default()
        };
        assert!(report.is_clean());

        report.missing_columns.push("ZONA".into());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_options_tags_are_distinct() {
        let tags: Vec<&str> = NormalizeOptions::ALL.iter().map(|o| o.tag()).collect();
        assert_eq!(tags, vec!["dedup", "raw"]);
    }

    #[test]
    fn test_normalize_reports_missing_columns_without_failing() {
        let schema = Domain::Recaudo.schema();
        let s = sheet(&["FUENTE", "POR_VENCER"], vec![vec![text("BANCO"), text("10")]]);

        let out = normalize(&s, &schema, &NormalizeOptions::default()).unwrap();
        assert_eq!(out.table.len(), 1);
        assert!(out.report.missing_columns.contains(&"DIAS_VENCIDOS".to_string()));
        assert!(!out.report.missing_columns.contains(&"POR_VENCER".to_string()));

        let err = out.report.schema_error(Domain::Recaudo).unwrap();
        assert_eq!(err.code(), "schema");
    }

    fn cartera_sheet(rows: Vec<Vec<RawCell>>) -> RawSheet {
        sheet(
            &["Cuenta", "Razón Social", "Placa", "Vencimiento", "Total Cuota"],
            rows,
        )
    }

    #[test]
    fn test_cartera_fills_missing_numbers_with_zero() {
        let schema = Domain::Cartera.schema();
        let s = cartera_sheet(vec![vec![
            RawCell::Number(130505010.0),
            text("ACME"),
            text("ABC123"),
            text("2024-10-30"),
            RawCell::Empty,
        ]]);

        let out = normalize(&s, &schema, &NormalizeOptions::default()).unwrap();
        assert_eq!(out.table.numbers("Total Cuota").unwrap(), &[Some(0.0)]);
        assert_eq!(out.table.text("Cuenta").unwrap(), &[Some("130505010".to_string())]);
    }

    #[test]
    fn test_cartera_dedup_removes_composite_duplicates_and_is_idempotent() {
        let schema = Domain::Cartera.schema();
        let s = cartera_sheet(vec![
            vec![text("130505010"), text("ACME SAS"), text("abc123"), text("2024-10-30"), text("100")],
            vec![text("130505010"), text(" acme sas "), text("ABC123"), text("2024-10-30"), text("100")],
            vec![text("130505010"), text("ACME SAS"), text("ABC123"), text("2024-11-30"), text("100")],
            vec![text("130505011"), text("OTRO"), text("XYZ999"), text("2024-10-30"), text("50")],
        ]);

        let out = normalize(&s, &schema, &NormalizeOptions::default()).unwrap();
        assert_eq!(out.table.len(), 3);
        assert_eq!(out.report.duplicates_removed, 1);
        // First occurrence kept
        assert_eq!(out.table.text("Placa").unwrap()[0], Some("abc123".to_string()));

        let (again, removed) = deduplicate(&out.table, schema.dedup_key, None);
        assert_eq!(removed, 0);
        assert_eq!(again.len(), out.table.len());
    }

    #[test]
    fn test_cartera_dedup_prefers_latest_update_date() {
        let schema = Domain::Cartera.schema();
        let s = sheet(
            &["Razon Social", "Placa", "Vencimiento", "Fecha Corte", "Total Cuota"],
            vec![
                vec![text("ACME"), text("ABC123"), text("2024-10-30"), text("2024-10-01"), text("100")],
                vec![text("ACME"), text("ABC123"), text("2024-10-30"), text("2024-10-15"), text("80")],
                vec![text("BETA"), text("QWE456"), text("2024-10-30"), text("2024-10-01"), text("40")],
            ],
        );

        let out = normalize(&s, &schema, &NormalizeOptions::default()).unwrap();
        assert_eq!(out.table.len(), 2);
        assert_eq!(out.table.numbers("Total Cuota").unwrap(), &[Some(80.0), Some(40.0)]);
    }

    #[test]
    fn test_cartera_dedup_skipped_when_key_column_missing() {
        let schema = Domain::Cartera.schema();
        let s = sheet(
            &["Razon Social", "Vencimiento", "Total Cuota"],
            vec![
                vec![text("ACME"), text("2024-10-30"), text("100")],
                vec![text("ACME"), text("2024-10-30"), text("100")],
            ],
        );

        let out = normalize(&s, &schema, &NormalizeOptions::default()).unwrap();
        assert_eq!(out.table.len(), 2);
        assert_eq!(out.report.duplicates_removed, 0);
        assert!(out.report.missing_columns.contains(&"Placa".to_string()));
    }

    #[test]
    fn test_dedup_disabled_by_option() {
        let schema = Domain::Cartera.schema();
        let row = vec![text("130505010"), text("ACME"), text("ABC123"), text("2024-10-30"), text("100")];
        let s = cartera_sheet(vec![row.clone(), row]);

        let out = normalize(&s, &schema, &NormalizeOptions { deduplicate: false }).unwrap();
        assert_eq!(out.table.len(), 2);
    }
}
