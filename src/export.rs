// 📤 Export - filtered tables to CSV, KPI reports to JSON

use crate::domain::Domain;
use crate::kpis::KpiReport;
use crate::table::Table;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::{QuoteStyle, WriterBuilder};
use log::info;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Spreadsheet apps need the BOM to read UTF-8 accents correctly
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// `recaudo_filtrado_20241031_154500.csv`
pub fn export_file_name(domain: Domain, at: NaiveDateTime) -> String {
    format!("{}_filtrado_{}.csv", domain.code(), at.format("%Y%m%d_%H%M%S"))
}

/// Colombian peso style: "$1.234.567" (no decimals, dot thousands)
pub fn format_cop(value: f64) -> String {
    if !value.is_finite() {
        return "—".to_string();
    }
    let rounded = value.round().abs() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if value.round() < 0.0 { "-" } else { "" };
    format!("{}${}", sign, grouped)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    Ok(())
}

/// Write a table as CSV (UTF-8 with BOM). Nulls become empty cells.
pub fn write_csv(table: &Table, path: &Path) -> Result<usize> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut out = BufWriter::new(file);
    out.write_all(UTF8_BOM)?;

    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(out);

    wtr.write_record(table.column_names())?;
    for row in 0..table.len() {
        let cells: Vec<String> = table
            .row(row)
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        wtr.write_record(&cells)?;
    }
    wtr.flush()?;

    info!("📤 {} rows → {}", table.len(), path.display());
    Ok(table.len())
}

pub fn write_kpis_json(report: &KpiReport, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(report).context("Failed to serialize KPI report")?;
    fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    info!("📤 KPI report → {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use crate::kpis::{pipeline, DomainKpis};
    use crate::table::ColumnValues;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    #[test]
    fn test_export_file_name() {
        let at = NaiveDate::from_ymd_opt(2024, 10, 31)
            .unwrap()
            .and_hms_opt(15, 45, 0)
            .unwrap();
        assert_eq!(
            export_file_name(Domain::Cartera, at),
            "cartera_filtrado_20241031_154500.csv"
        );
    }

    #[test]
    fn test_format_cop() {
        assert_eq!(format_cop(1_234_567.4), "$1.234.567");
        assert_eq!(format_cop(999.0), "$999");
        assert_eq!(format_cop(0.0), "$0");
        assert_eq!(format_cop(-1500.0), "-$1.500");
        assert_eq!(format_cop(f64::NAN), "—");
    }

    #[test]
    fn test_write_csv_with_bom_and_nulls() {
        let mut t = Table::new(2);
        t.push_column(
            "Razon Social",
            ColumnValues::Text(vec![Some("Pérez, Juan".into()), None]),
        )
        .unwrap();
        t.push_column("Total Cuota", ColumnValues::Number(vec![Some(1500.0), Some(0.5)]))
            .unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("cartera.csv");
        assert_eq!(write_csv(&t, &path).unwrap(), 2);

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(
            text,
            "Razon Social,Total Cuota\n\"Pérez, Juan\",1500\n,0.5\n"
        );
    }

    #[test]
    fn test_write_kpis_json() {
        let mut t = Table::new(1);
        t.push_column("ESTADO", ColumnValues::Text(vec![Some("APROBADO".into())]))
            .unwrap();
        let kpis = pipeline::compute(&t, &DashboardConfig::default(), None).unwrap();
        let report = KpiReport {
            domain: Domain::Pipeline,
            period: None,
            files: vec!["pipeline-2024.xlsx".into()],
            warnings: Vec::new(),
            kpis: DomainKpis::Pipeline { kpis },
        };

        let dir = tempdir().unwrap();
        let path = dir.path().join("kpis.json");
        write_kpis_json(&report, &path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["domain"], "pipeline");
        assert_eq!(json["kpis"]["domain"], "pipeline");
        assert_eq!(json["kpis"]["kpis"]["summary"]["total"], 1);
        assert_eq!(json["files"][0], "pipeline-2024.xlsx");
    }
}
