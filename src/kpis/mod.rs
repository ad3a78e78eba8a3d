// 📈 KPI Aggregator - read-only summaries over canonical tables
// Same table in, same numbers out: ordered maps and stable sorts only.

pub mod cartera;
pub mod colocacion;
pub mod pipeline;
pub mod recaudo;

use crate::config::DashboardConfig;
use crate::domain::{Domain, Period};
use crate::error::DashboardError;
use crate::loader::{DomainLoad, Loader};
use crate::normalizer::NormalizeOptions;
use crate::table::Table;
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use cartera::{CarteraKpis, Company, CompanyComparison, CompanyMetrics};
pub use colocacion::ColocacionKpis;
pub use pipeline::PipelineKpis;
pub use recaudo::{RecaudoComparison, RecaudoKpis};

// ============================================================================
// SHARED PIECES
// ============================================================================

/// Current vs previous value of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodDelta {
    pub current: f64,
    pub previous: f64,
    pub delta: f64,
    /// None when the previous value is 0
    pub pct_change: Option<f64>,
}

impl PeriodDelta {
    pub fn new(current: f64, previous: f64) -> Self {
        let delta = current - previous;
        let pct_change = (previous != 0.0).then(|| delta / previous * 100.0);
        PeriodDelta {
            current,
            previous,
            delta,
            pct_change,
        }
    }

    pub fn counts(current: usize, previous: usize) -> Self {
        PeriodDelta::new(current as f64, previous as f64)
    }
}

/// `part / whole * 100`, or 0 when there is no whole
pub fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountEntry {
    pub key: String,
    pub count: usize,
}

/// Row indices per distinct non-null value of a text column
pub(crate) fn group_rows(table: &Table, column: &str) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    if let Some(col) = table.column(column) {
        for row in 0..table.len() {
            if let Some(key) = col.values.display(row) {
                groups.entry(key).or_default().push(row);
            }
        }
    }
    groups
}

/// Most frequent values of a column, count desc then key asc
pub(crate) fn top_values(table: &Table, column: &str, limit: usize) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = group_rows(table, column)
        .into_iter()
        .map(|(key, rows)| CountEntry {
            key,
            count: rows.len(),
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(limit);
    entries
}

/// Sum of a numeric column over some rows; None when the column is absent
pub(crate) fn sum_rows(table: &Table, column: &str, rows: &[usize]) -> Option<f64> {
    let values = table.numbers(column)?;
    Some(rows.iter().filter_map(|&i| values[i]).sum())
}

pub(crate) fn mean_rows(table: &Table, column: &str, rows: &[usize]) -> Option<f64> {
    let values = table.numbers(column)?;
    let present: Vec<f64> = rows.iter().filter_map(|&i| values[i]).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

// ============================================================================
// DOMAIN SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "domain", rename_all = "lowercase")]
pub enum DomainKpis {
    Recaudo {
        kpis: RecaudoKpis,
        comparison: Option<RecaudoComparison>,
    },
    Cartera {
        kpis: CarteraKpis,
        comparison: Vec<CompanyComparison>,
    },
    Pipeline {
        kpis: PipelineKpis,
    },
    Colocacion {
        kpis: ColocacionKpis,
    },
}

/// Everything the CLI prints or exports for one domain
#[derive(Debug, Clone, Serialize)]
pub struct KpiReport {
    pub domain: Domain,
    pub period: Option<Period>,
    pub files: Vec<String>,
    pub warnings: Vec<String>,
    pub kpis: DomainKpis,
}

fn warnings_of(load: &DomainLoad) -> Vec<String> {
    let mut warnings: Vec<String> = load.schema_errors().iter().map(|e| e.to_string()).collect();
    warnings.extend(
        load.skipped
            .iter()
            .map(|s| format!("skipped {}: {}", s.path.display(), s.reason)),
    );
    warnings
}

fn file_names(load: &DomainLoad) -> Vec<String> {
    load.files.iter().map(|f| f.source.file_name()).collect()
}

/// Requested period, or the newest one with files
fn resolve_period(loader: &Loader, domain: Domain, period: Option<Period>) -> Result<Period> {
    if let Some(p) = period {
        return Ok(p);
    }
    loader.periods(domain)?.into_iter().next().ok_or_else(|| {
        DashboardError::MissingData {
            domain,
            dir: domain.raw_dir(loader.data_dir()),
            period: None,
        }
        .into()
    })
}

/// Previous month's load, if its file exists; other failures propagate
fn load_previous(
    loader: &Loader,
    domain: Domain,
    period: &Period,
    options: NormalizeOptions,
) -> Result<Option<DomainLoad>> {
    let previous = match period.previous_month() {
        Some(p) => p,
        None => return Ok(None),
    };
    match loader.load_period_with(domain, &previous, options) {
        Ok(load) => Ok(Some(load)),
        Err(e) => match e.downcast_ref::<DashboardError>() {
            Some(DashboardError::MissingData { .. }) => {
                info!("{}: no file for {}, comparison skipped", domain, previous);
                Ok(None)
            }
            _ => Err(e),
        },
    }
}

/// Load what the domain needs and compute its KPIs
pub fn summarize(
    loader: &Loader,
    config: &DashboardConfig,
    domain: Domain,
    period: Option<Period>,
) -> Result<KpiReport> {
    match domain {
        Domain::Recaudo => {
            let period = resolve_period(loader, domain, period)?;
            let load = loader.load_period(domain, &period)?;
            let kpis = recaudo::compute(&load.table);
            let options = loader.options_for(domain);
            let comparison = load_previous(loader, domain, &period, options)?.map(|prev| {
                let prev_kpis = recaudo::compute(&prev.table);
                recaudo::compare(&kpis, &prev_kpis)
            });
            Ok(KpiReport {
                domain,
                period: Some(period),
                files: file_names(&load),
                warnings: warnings_of(&load),
                kpis: DomainKpis::Recaudo { kpis, comparison },
            })
        }
        Domain::Cartera => {
            let period = resolve_period(loader, domain, period)?;
            let load = loader.load_period(domain, &period)?;
            let kpis = cartera::compute(&load.table);
            // Period comparison always keeps duplicate rows on both sides
            let raw = NormalizeOptions { deduplicate: false };
            let comparison = match load_previous(loader, domain, &period, raw)? {
                Some(prev) => {
                    let current = loader.load_period_with(domain, &period, raw)?;
                    cartera::compare_periods(&prev.table, &current.table)
                }
                None => Vec::new(),
            };
            Ok(KpiReport {
                domain,
                period: Some(period),
                files: file_names(&load),
                warnings: warnings_of(&load),
                kpis: DomainKpis::Cartera { kpis, comparison },
            })
        }
        Domain::Pipeline => {
            let load = loader.load_domain(domain)?;
            let kpis = pipeline::compute(&load.table, config, period)?;
            Ok(KpiReport {
                domain,
                period: kpis.period,
                files: file_names(&load),
                warnings: warnings_of(&load),
                kpis: DomainKpis::Pipeline { kpis },
            })
        }
        Domain::Colocacion => {
            let load = loader.load_domain(domain)?;
            if load.table.is_empty() {
                warn!("⚠️  colocacion: no rows loaded ({} files skipped)", load.skipped.len());
            }
            let kpis = colocacion::compute(&load.table, period)?;
            Ok(KpiReport {
                domain,
                period: Period::month(kpis.year, kpis.cut_month),
                files: file_names(&load),
                warnings: warnings_of(&load),
                kpis: DomainKpis::Colocacion { kpis },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnValues;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_period_delta() {
        let d = PeriodDelta::new(150.0, 100.0);
        assert_eq!(d.delta, 50.0);
        assert_eq!(d.pct_change, Some(50.0));

        let from_zero = PeriodDelta::counts(3, 0);
        assert_eq!(from_zero.delta, 3.0);
        assert_eq!(from_zero.pct_change, None);
    }

    #[test]
    fn test_percent_guards_zero_total() {
        assert_eq!(percent(25.0, 200.0), 12.5);
        assert_eq!(percent(25.0, 0.0), 0.0);
    }

    #[test]
    fn test_top_values_ordering() {
        let mut t = Table::new(5);
        t.push_column(
            "ZONA",
            ColumnValues::Text(vec![
                Some("SUR".into()),
                Some("NORTE".into()),
                Some("SUR".into()),
                None,
                Some("CENTRO".into()),
            ]),
        )
        .unwrap();

        let top = top_values(&t, "ZONA", 2);
        assert_eq!(top[0], CountEntry { key: "SUR".into(), count: 2 });
        assert_eq!(top[1], CountEntry { key: "CENTRO".into(), count: 1 });
        assert!(top_values(&t, "CLIENTE", 10).is_empty());
    }

    #[test]
    fn test_cartera_comparison_keeps_duplicate_rows() {
        let dir = tempdir().unwrap();
        let config = DashboardConfig {
            data_dir: dir.path().to_path_buf(),
            ..DashboardConfig::default()
        };
        let raw = Domain::Cartera.raw_dir(dir.path());
        fs::create_dir_all(&raw).unwrap();
        for (name, due) in [
            ("cartera-2024-9.csv", "30/09/2024"),
            ("cartera-2024-10.csv", "30/10/2024"),
        ] {
            let body = format!(
                "EMPRESA\nNIT\nREPORTE CARTERA\nCIUDAD\nFECHA CORTE\nUSUARIO\n,,,,\n\
                 Cuenta,Razón Social,Placa,Vencimiento,Total Cuota\n\
                 130505010,ACME,ABC123,{due},100\n\
                 130505010,ACME,ABC123,{due},100\n"
            );
            fs::write(raw.join(name), body).unwrap();
        }

        let loader = Loader::new(&config);
        let report = summarize(&loader, &config, Domain::Cartera, Period::month(2024, 10)).unwrap();
        match report.kpis {
            DomainKpis::Cartera { kpis, comparison } => {
                // Current-period KPIs honor the configured dedup
                assert_eq!(kpis.totals.total_cuota, 100.0);
                assert_eq!(comparison.len(), 1);
                assert_eq!(comparison[0].company, Company::GrupoEstrategico);
                assert_eq!(comparison[0].total_before, 200.0);
                assert_eq!(comparison[0].total_after, 200.0);
                assert_eq!(comparison[0].variation, 0.0);
            }
            other => panic!("unexpected kpis: {:?}", other),
        }
    }
}
