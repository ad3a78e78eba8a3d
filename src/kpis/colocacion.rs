// Colocación KPIs - invoiced units and TOTALFAC, year to date and month over month

use super::PeriodDelta;
use crate::domain::{Domain, Period};
use crate::error::DashboardError;
use crate::table::Table;
use anyhow::Result;
use chrono::Datelike;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DIMENSIONS: [&str; 4] = ["CENTRO_COSTO", "VENDEDOR", "MODALIDAD_VENTA", "BODEGA"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthFigures {
    pub period: Period,
    pub units: usize,
    pub total: f64,
    /// total / units, 0 without units
    pub ticket: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthComparison {
    pub current: MonthFigures,
    pub previous: MonthFigures,
    pub units: PeriodDelta,
    pub total: PeriodDelta,
    pub ticket: PeriodDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub key: String,
    pub units: usize,
    pub total: f64,
    pub previous_units: usize,
    pub previous_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColocacionKpis {
    pub year: i32,
    /// Last month included in the year-to-date figures
    pub cut_month: u32,
    pub records: usize,
    /// Rows with neither ANIO/MES nor a document date
    pub undated: usize,
    pub ytd_units: PeriodDelta,
    pub ytd_total: PeriodDelta,
    pub ticket_promedio: f64,
    pub ticket_promedio_previous: f64,
    pub vs_previous_month: MonthComparison,
    pub vs_prior_year: MonthComparison,
    /// Year-to-date units and totals per dimension, units desc
    pub by_dimension: BTreeMap<String, Vec<DimensionSummary>>,
}

fn schema_error(columns: &[&str]) -> DashboardError {
    DashboardError::Schema {
        domain: Domain::Colocacion,
        columns: columns.iter().map(|c| c.to_string()).collect(),
    }
}

/// Year and month of each row: ANIO/MES when present, else FECHA_DOCUMENTO
fn row_months(table: &Table) -> Result<Vec<Option<(i32, u32)>>> {
    let anio = table.numbers("ANIO");
    let mes = table.numbers("MES");
    let fecha = table.dates("FECHA_DOCUMENTO");
    if (anio.is_none() || mes.is_none()) && fecha.is_none() {
        return Err(schema_error(&["ANIO", "MES"]).into());
    }

    let from_columns = |row: usize| -> Option<(i32, u32)> {
        let y = anio?[row]?;
        let m = mes?[row]?;
        let valid = y.fract() == 0.0 && y > 0.0 && (1.0..=12.0).contains(&m) && m.fract() == 0.0;
        valid.then_some((y as i32, m as u32))
    };
    let from_date = |row: usize| fecha.and_then(|f| f[row]).map(|d| (d.year(), d.month()));

    Ok((0..table.len())
        .map(|row| from_columns(row).or_else(|| from_date(row)))
        .collect())
}

fn ticket(total: f64, units: usize) -> f64 {
    if units > 0 {
        total / units as f64
    } else {
        0.0
    }
}

fn rows_where<F>(months: &[Option<(i32, u32)>], pred: F) -> Vec<usize>
where
    F: Fn(i32, u32) -> bool,
{
    months
        .iter()
        .enumerate()
        .filter_map(|(i, ym)| ym.filter(|&(y, m)| pred(y, m)).map(|_| i))
        .collect()
}

fn total_of(amounts: &[Option<f64>], rows: &[usize]) -> f64 {
    rows.iter().filter_map(|&i| amounts[i]).sum()
}

fn month_figures(months: &[Option<(i32, u32)>], amounts: &[Option<f64>], year: i32, month: u32) -> MonthFigures {
    let rows = rows_where(months, |y, m| y == year && m == month);
    let total = total_of(amounts, &rows);
    MonthFigures {
        period: Period {
            year,
            month: Some(month),
        },
        units: rows.len(),
        total,
        ticket: ticket(total, rows.len()),
    }
}

fn compare_months(current: MonthFigures, previous: MonthFigures) -> MonthComparison {
    MonthComparison {
        units: PeriodDelta::counts(current.units, previous.units),
        total: PeriodDelta::new(current.total, previous.total),
        ticket: PeriodDelta::new(current.ticket, previous.ticket),
        current,
        previous,
    }
}

fn summarize_dimension(
    table: &Table,
    column: &str,
    amounts: &[Option<f64>],
    current: &[usize],
    previous: &[usize],
) -> Option<Vec<DimensionSummary>> {
    let col = table.column(column)?;
    let mut groups: BTreeMap<String, DimensionSummary> = BTreeMap::new();
    let mut add = |row: usize, is_current: bool| {
        let Some(key) = col.values.display(row) else { return };
        let entry = groups.entry(key.clone()).or_insert(DimensionSummary {
            key,
            units: 0,
            total: 0.0,
            previous_units: 0,
            previous_total: 0.0,
        });
        let amount = amounts[row].unwrap_or(0.0);
        if is_current {
            entry.units += 1;
            entry.total += amount;
        } else {
            entry.previous_units += 1;
            entry.previous_total += amount;
        }
    };
    current.iter().for_each(|&r| add(r, true));
    previous.iter().for_each(|&r| add(r, false));

    let mut out: Vec<DimensionSummary> = groups.into_values().collect();
    // BTreeMap order is the key tie-break; the sort is stable
    out.sort_by(|a, b| b.units.cmp(&a.units));
    Some(out)
}

/// Requested year (or the latest) and its requested month (or latest month)
fn select_cut(months: &[Option<(i32, u32)>], requested: Option<Period>) -> Option<(i32, u32)> {
    let available: BTreeSet<(i32, u32)> = months.iter().flatten().copied().collect();
    let latest_year = available.iter().next_back()?.0;

    let year = match requested {
        Some(p) if available.iter().any(|(y, _)| *y == p.year) => p.year,
        Some(p) => {
            warn!("⚠️  colocacion: no records for {}, showing {}", p.year, latest_year);
            latest_year
        }
        None => latest_year,
    };

    let latest_month = available
        .iter()
        .filter(|(y, _)| *y == year)
        .map(|(_, m)| *m)
        .max()?;
    let month = match requested.and_then(|p| p.month) {
        Some(m) if available.contains(&(year, m)) => m,
        Some(m) => {
            warn!("⚠️  colocacion: no records for {}-{:02}, cutting at {:02}", year, m, latest_month);
            latest_month
        }
        None => latest_month,
    };
    Some((year, month))
}

pub fn compute(table: &Table, period: Option<Period>) -> Result<ColocacionKpis> {
    let amounts = table
        .numbers("TOTALFAC")
        .ok_or_else(|| schema_error(&["TOTALFAC"]))?;
    let months = row_months(table)?;
    let (year, cut_month) = select_cut(&months, period).ok_or_else(|| schema_error(&["ANIO", "MES"]))?;

    let ytd_rows = rows_where(&months, |y, m| y == year && m <= cut_month);
    let ytd_prev_rows = rows_where(&months, |y, m| y == year - 1 && m <= cut_month);
    let ytd_total = total_of(amounts, &ytd_rows);
    let ytd_prev_total = total_of(amounts, &ytd_prev_rows);

    let current = month_figures(&months, amounts, year, cut_month);
    let (prev_year, prev_month) = if cut_month == 1 {
        (year - 1, 12)
    } else {
        (year, cut_month - 1)
    };
    let previous_month = month_figures(&months, amounts, prev_year, prev_month);
    let same_month_last_year = month_figures(&months, amounts, year - 1, cut_month);

    let by_dimension = DIMENSIONS
        .iter()
        .filter_map(|&dim| {
            summarize_dimension(table, dim, amounts, &ytd_rows, &ytd_prev_rows)
                .map(|s| (dim.to_string(), s))
        })
        .collect();

    Ok(ColocacionKpis {
        year,
        cut_month,
        records: table.len(),
        undated: months.iter().filter(|m| m.is_none()).count(),
        ytd_units: PeriodDelta::counts(ytd_rows.len(), ytd_prev_rows.len()),
        ytd_total: PeriodDelta::new(ytd_total, ytd_prev_total),
        ticket_promedio: ticket(ytd_total, ytd_rows.len()),
        ticket_promedio_previous: ticket(ytd_prev_total, ytd_prev_rows.len()),
        vs_previous_month: compare_months(current, previous_month),
        vs_prior_year: compare_months(current, same_month_last_year),
        by_dimension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnValues;
    use chrono::NaiveDate;

    // (anio, mes, totalfac, vendedor)
    fn table(rows: &[(i32, u32, f64, &str)]) -> Table {
        let mut t = Table::new(rows.len());
        t.push_column("ANIO", ColumnValues::Number(rows.iter().map(|r| Some(r.0 as f64)).collect()))
            .unwrap();
        t.push_column("MES", ColumnValues::Number(rows.iter().map(|r| Some(r.1 as f64)).collect()))
            .unwrap();
        t.push_column("TOTALFAC", ColumnValues::Number(rows.iter().map(|r| Some(r.2)).collect()))
            .unwrap();
        t.push_column(
            "VENDEDOR",
            ColumnValues::Text(rows.iter().map(|r| Some(r.3.to_string())).collect()),
        )
        .unwrap();
        t
    }

    fn sample() -> Table {
        table(&[
            (2024, 1, 100.0, "ANA"),
            (2024, 2, 300.0, "LUIS"),
            (2024, 3, 200.0, "ANA"),
            (2024, 3, 400.0, "LUIS"),
            (2024, 3, 50.0, "ANA"),
            (2023, 1, 80.0, "ANA"),
            (2023, 3, 120.0, "LUIS"),
            (2023, 4, 999.0, "LUIS"),
            (2023, 12, 70.0, "ANA"),
        ])
    }

    #[test]
    fn test_defaults_to_latest_year_and_month() {
        let k = compute(&sample(), None).unwrap();
        assert_eq!((k.year, k.cut_month), (2024, 3));
        assert_eq!(k.records, 9);
        assert_eq!(k.undated, 0);
    }

    #[test]
    fn test_ytd_against_same_span_of_prior_year() {
        let k = compute(&sample(), None).unwrap();
        assert_eq!(k.ytd_units.current, 5.0);
        assert_eq!(k.ytd_units.previous, 2.0);
        assert_eq!(k.ytd_total.current, 1050.0);
        // April 2023 is past the cut month
        assert_eq!(k.ytd_total.previous, 200.0);
        assert_eq!(k.ticket_promedio, 210.0);
        assert_eq!(k.ticket_promedio_previous, 100.0);
    }

    #[test]
    fn test_month_comparisons() {
        let k = compute(&sample(), None).unwrap();
        let prev = &k.vs_previous_month;
        assert_eq!(prev.current.units, 3);
        assert_eq!(prev.current.total, 650.0);
        assert_eq!(prev.previous.period, Period::month(2024, 2).unwrap());
        assert_eq!(prev.total.delta, 350.0);

        let ly = &k.vs_prior_year;
        assert_eq!(ly.previous.period, Period::month(2023, 3).unwrap());
        assert_eq!(ly.previous.total, 120.0);
        assert_eq!(ly.units.delta, 2.0);
    }

    #[test]
    fn test_january_compares_with_december() {
        let k = compute(&sample(), Period::month(2024, 1)).unwrap();
        assert_eq!(k.cut_month, 1);
        assert_eq!(k.vs_previous_month.previous.period, Period::month(2023, 12).unwrap());
        assert_eq!(k.vs_previous_month.previous.total, 70.0);
    }

    #[test]
    fn test_missing_year_falls_back_to_latest() {
        let k = compute(&sample(), Some(Period::year(2019))).unwrap();
        assert_eq!((k.year, k.cut_month), (2024, 3));
    }

    #[test]
    fn test_dimension_summary_sorted_by_units() {
        let k = compute(&sample(), None).unwrap();
        let vendedores = &k.by_dimension["VENDEDOR"];
        assert_eq!(vendedores[0].key, "ANA");
        assert_eq!(vendedores[0].units, 3);
        assert_eq!(vendedores[0].total, 350.0);
        assert_eq!(vendedores[0].previous_units, 1);
        assert_eq!(vendedores[1].key, "LUIS");
        assert_eq!(vendedores[1].previous_total, 120.0);
        assert!(!k.by_dimension.contains_key("BODEGA"));
    }

    #[test]
    fn test_year_and_month_from_document_date() {
        let mut t = Table::new(2);
        t.push_column("TOTALFAC", ColumnValues::Number(vec![Some(10.0), Some(20.0)]))
            .unwrap();
        t.push_column(
            "FECHA_DOCUMENTO",
            ColumnValues::Date(vec![NaiveDate::from_ymd_opt(2024, 5, 2), None]),
        )
        .unwrap();

        let k = compute(&t, None).unwrap();
        assert_eq!((k.year, k.cut_month), (2024, 5));
        assert_eq!(k.undated, 1);
        assert_eq!(k.ytd_total.current, 10.0);
    }

    #[test]
    fn test_schema_errors() {
        let mut no_total = Table::new(1);
        no_total
            .push_column("ANIO", ColumnValues::Number(vec![Some(2024.0)]))
            .unwrap();
        let err = compute(&no_total, None).unwrap_err();
        match err.downcast_ref::<DashboardError>() {
            Some(DashboardError::Schema { columns, .. }) => assert_eq!(columns, &["TOTALFAC"]),
            other => panic!("unexpected {:?}", other),
        }

        let mut no_period = Table::new(1);
        no_period
            .push_column("TOTALFAC", ColumnValues::Number(vec![Some(1.0)]))
            .unwrap();
        assert!(compute(&no_period, None).is_err());
    }
}
