// Cartera KPIs - portfolio per company (by ledger account) and zone risk

use super::{group_rows, percent, sum_rows};
use crate::aging::AgingBucket;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// COMPANY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Company {
    SolucionesIntegrales,
    Finaliados,
    GrupoEstrategico,
    Agm,
    Motofacil,
    Motored,
    CarteraCastigada,
    Otras,
    SinClasificar,
}

impl Company {
    /// Display order of the portfolio page
    pub const PREFERRED_ORDER: [Company; 9] = [
        Company::SolucionesIntegrales,
        Company::Finaliados,
        Company::GrupoEstrategico,
        Company::Agm,
        Company::Motofacil,
        Company::Motored,
        Company::CarteraCastigada,
        Company::Otras,
        Company::SinClasificar,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Company::SolucionesIntegrales => "Soluciones Integrales",
            Company::Finaliados => "Finaliados",
            Company::GrupoEstrategico => "Grupo Estrategico",
            Company::Agm => "AGM",
            Company::Motofacil => "Motofacil",
            Company::Motored => "Motored",
            Company::CarteraCastigada => "Cartera Castigada",
            Company::Otras => "Otras",
            Company::SinClasificar => "Sin Clasificar",
        }
    }

    /// Written-off, unknown and unclassified accounts stay out of zone risk
    pub fn in_zone_risk(&self) -> bool {
        !matches!(
            self,
            Company::CarteraCastigada | Company::Otras | Company::SinClasificar
        )
    }

    /// Company owning a ledger account number
    pub fn classify(account: Option<&str>) -> Company {
        let raw = match account.map(str::trim) {
            Some(a) if !a.is_empty() => a,
            _ => return Company::SinClasificar,
        };

        // "130505010.0" from float cells; other dots are thousands separators
        let digits: String = match raw.parse::<f64>() {
            Ok(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
            _ => raw.chars().filter(|c| !matches!(c, '.' | ' ' | ',')).collect(),
        };

        match digits.as_str() {
            "137010001" | "137010002" | "137010003" | "137010004" | "137010005"
            | "137010006" | "137010999" => Company::SolucionesIntegrales,
            "130505010" => Company::GrupoEstrategico,
            "130505011" => Company::Finaliados,
            "130505012" => Company::Agm,
            "130505013" => Company::Motofacil,
            "130505014" => Company::Motored,
            other => match other.parse::<u64>() {
                Ok(n) if (139_905_000..=139_905_005).contains(&n) => Company::CarteraCastigada,
                _ => Company::Otras,
            },
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub total_cuota: f64,
    pub por_vencer: f64,
    pub dias30: f64,
    pub dias60: f64,
    pub dias90: f64,
    pub dias_mas90: f64,
}

/// Share of the portfolio per bucket, in percent (0 when the total is 0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskIndices {
    pub corriente: f64,
    pub tipo_b: f64,
    pub tipo_c: f64,
    pub tipo_d: f64,
    pub tipo_e: f64,
    pub mora: f64,
}

impl PortfolioTotals {
    fn over(table: &Table, rows: &[usize]) -> Self {
        let sum = |bucket: AgingBucket| sum_rows(table, bucket.cartera_column(), rows).unwrap_or(0.0);
        PortfolioTotals {
            total_cuota: sum_rows(table, "Total Cuota", rows).unwrap_or(0.0),
            por_vencer: sum(AgingBucket::Current),
            dias30: sum(AgingBucket::Days30),
            dias60: sum(AgingBucket::Days60),
            dias90: sum(AgingBucket::Days90),
            dias_mas90: sum(AgingBucket::Over90),
        }
    }

    pub fn overdue(&self) -> f64 {
        self.dias30 + self.dias60 + self.dias90 + self.dias_mas90
    }

    pub fn indices(&self) -> RiskIndices {
        let t = self.total_cuota;
        RiskIndices {
            corriente: percent(self.por_vencer, t),
            tipo_b: percent(self.dias30, t),
            tipo_c: percent(self.dias60, t),
            tipo_d: percent(self.dias90, t),
            tipo_e: percent(self.dias_mas90, t),
            mora: percent(self.overdue(), t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMetrics {
    pub company: Company,
    pub records: usize,
    pub totals: PortfolioTotals,
    pub indices: RiskIndices,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRisk {
    pub zone: String,
    pub records: usize,
    pub totals: PortfolioTotals,
    pub indices: RiskIndices,
    /// B×1 + C×2 + D×3 + E×5
    pub risk_score: f64,
    /// 0.3 for tiny zones up to 1.0 at ~100 records
    pub confidence: f64,
    pub normalized_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarteraKpis {
    pub records: usize,
    pub totals: PortfolioTotals,
    pub indices: RiskIndices,
    /// Companies present, in preferred order
    pub companies: Vec<CompanyMetrics>,
    /// Riskiest zones first
    pub zones: Vec<ZoneRisk>,
}

/// Company of every row
pub fn companies(table: &Table) -> Vec<Company> {
    match table.column("Cuenta") {
        Some(col) => (0..table.len())
            .map(|i| Company::classify(col.values.display(i).as_deref()))
            .collect(),
        None => vec![Company::SinClasificar; table.len()],
    }
}

fn rows_of(companies: &[Company], company: Company) -> Vec<usize> {
    companies
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == company)
        .map(|(i, _)| i)
        .collect()
}

pub fn confidence_factor(records: usize) -> f64 {
    if records == 0 {
        return 0.3;
    }
    (0.3 + ((records as f64 + 1.0).log10() / 100f64.log10()) * 0.7).min(1.0)
}

fn zone_risk(table: &Table, companies: &[Company]) -> Vec<ZoneRisk> {
    let mut zones: Vec<ZoneRisk> = group_rows(table, "Zona")
        .into_iter()
        .filter_map(|(zone, rows)| {
            let rows: Vec<usize> = rows.into_iter().filter(|&i| companies[i].in_zone_risk()).collect();
            if rows.is_empty() {
                return None;
            }
            let totals = PortfolioTotals::over(table, &rows);
            let indices = totals.indices();
            let risk_score =
                indices.tipo_b + indices.tipo_c * 2.0 + indices.tipo_d * 3.0 + indices.tipo_e * 5.0;
            let confidence = confidence_factor(rows.len());
            Some(ZoneRisk {
                zone,
                records: rows.len(),
                totals,
                indices,
                risk_score,
                confidence,
                normalized_score: risk_score * confidence,
            })
        })
        .collect();

    zones.sort_by(|a, b| {
        b.normalized_score
            .partial_cmp(&a.normalized_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.zone.cmp(&b.zone))
    });
    zones
}

pub fn compute(table: &Table) -> CarteraKpis {
    let companies = companies(table);
    let all: Vec<usize> = (0..table.len()).collect();
    let totals = PortfolioTotals::over(table, &all);

    let per_company = Company::PREFERRED_ORDER
        .into_iter()
        .filter_map(|company| {
            let rows = rows_of(&companies, company);
            if rows.is_empty() {
                return None;
            }
            let totals = PortfolioTotals::over(table, &rows);
            Some(CompanyMetrics {
                company,
                records: rows.len(),
                indices: totals.indices(),
                totals,
            })
        })
        .collect();

    CarteraKpis {
        records: table.len(),
        indices: totals.indices(),
        totals,
        companies: per_company,
        zones: zone_risk(table, &companies),
    }
}

// ============================================================================
// PERIOD COMPARISON
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyComparison {
    pub company: Company,
    pub total_before: f64,
    pub total_after: f64,
    pub variation: f64,
    /// var / before × 100; 100 when only the later period has value
    pub variation_pct: f64,
    pub corriente_before: f64,
    pub corriente_after: f64,
    pub mora_before: f64,
    pub mora_after: f64,
}

/// Per-company comparison of two cartera cuts, sorted by company name
pub fn compare_periods(before: &Table, after: &Table) -> Vec<CompanyComparison> {
    let companies_before = companies(before);
    let companies_after = companies(after);

    let mut present: Vec<Company> = companies_before
        .iter()
        .chain(companies_after.iter())
        .copied()
        .collect();
    present.sort_by_key(|c| c.name());
    present.dedup();

    present
        .into_iter()
        .map(|company| {
            let t1 = PortfolioTotals::over(before, &rows_of(&companies_before, company));
            let t2 = PortfolioTotals::over(after, &rows_of(&companies_after, company));
            let variation = t2.total_cuota - t1.total_cuota;
            let variation_pct = if t1.total_cuota > 0.0 {
                variation / t1.total_cuota * 100.0
            } else if t2.total_cuota > 0.0 {
                100.0
            } else {
                0.0
            };
            let (i1, i2) = (t1.indices(), t2.indices());
            CompanyComparison {
                company,
                total_before: t1.total_cuota,
                total_after: t2.total_cuota,
                variation,
                variation_pct,
                corriente_before: i1.corriente,
                corriente_after: i2.corriente,
                mora_before: i1.mora,
                mora_after: i2.mora,
            }
        })
        .collect()
}
