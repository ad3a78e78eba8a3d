// Recaudo KPIs - bucket totals, aging counts, per-source summaries

use super::{mean_rows, sum_rows, top_values, CountEntry, PeriodDelta};
use crate::aging::{AgingBucket, BucketCounts};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DATE_COLUMNS: [&str; 2] = ["FECHA_VENCIMIENTO", "FECHA_RECAUDO"];
const TOP_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub key: String,
    pub records: usize,
    pub avg_days_overdue: Option<f64>,
    pub total_por_vencer: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaysStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecaudoKpis {
    pub records: usize,
    /// Sum per bucket column; buckets whose column is absent are left out
    pub bucket_totals: BTreeMap<AgingBucket, f64>,
    /// Sum of the bucket columns present
    pub total_recaudo: f64,
    /// 90 + more-than-90, only when both columns exist
    pub noventa_plus: Option<f64>,
    /// Records per aging bucket from DIAS_VENCIDOS
    pub aging: Option<BucketCounts>,
    pub days_overdue: Option<DaysStats>,
    /// Invalid or empty cells per date column
    pub invalid_dates: BTreeMap<String, usize>,
    pub by_fuente: Vec<SourceSummary>,
    pub by_nombre_fuente: Vec<SourceSummary>,
    pub top_zonas: Vec<CountEntry>,
    pub top_clientes: Vec<CountEntry>,
}

impl RecaudoKpis {
    pub fn bucket_total(&self, bucket: AgingBucket) -> Option<f64> {
        self.bucket_totals.get(&bucket).copied()
    }
}

fn summarize_by(table: &Table, column: &str) -> Vec<SourceSummary> {
    super::group_rows(table, column)
        .into_iter()
        .map(|(key, rows)| SourceSummary {
            records: rows.len(),
            avg_days_overdue: mean_rows(table, "DIAS_VENCIDOS", &rows),
            total_por_vencer: sum_rows(table, "POR_VENCER", &rows),
            key,
        })
        .collect()
}

fn days_stats(days: &[Option<f64>]) -> Option<DaysStats> {
    let present: Vec<f64> = days.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(DaysStats {
        count: present.len(),
        mean: present.iter().sum::<f64>() / present.len() as f64,
        min: present.iter().copied().fold(f64::INFINITY, f64::min),
        max: present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

pub fn compute(table: &Table) -> RecaudoKpis {
    let mut bucket_totals = BTreeMap::new();
    for bucket in AgingBucket::ALL {
        if let Some(total) = table.sum(bucket.recaudo_column()) {
            bucket_totals.insert(bucket, total);
        }
    }
    let total_recaudo = bucket_totals.values().sum();

    let noventa_plus = match (
        bucket_totals.get(&AgingBucket::Days90),
        bucket_totals.get(&AgingBucket::Over90),
    ) {
        (Some(a), Some(b)) => Some(a + b),
        _ => None,
    };

    let days = table.numbers("DIAS_VENCIDOS");

    let invalid_dates = DATE_COLUMNS
        .iter()
        .filter_map(|c| table.null_count(c).map(|n| (c.to_string(), n)))
        .filter(|(_, n)| *n > 0)
        .collect();

    RecaudoKpis {
        records: table.len(),
        bucket_totals,
        total_recaudo,
        noventa_plus,
        aging: days.map(BucketCounts::from_days),
        days_overdue: days.and_then(days_stats),
        invalid_dates,
        by_fuente: summarize_by(table, "FUENTE"),
        by_nombre_fuente: summarize_by(table, "NOMBRE_FUENTE"),
        top_zonas: top_values(table, "ZONA", TOP_LIMIT),
        top_clientes: top_values(table, "CLIENTE", TOP_LIMIT),
    }
}

/// Month over month: total recaudo and record count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecaudoComparison {
    pub total_recaudo: PeriodDelta,
    pub records: PeriodDelta,
    pub buckets: BTreeMap<AgingBucket, PeriodDelta>,
}

pub fn compare(current: &RecaudoKpis, previous: &RecaudoKpis) -> RecaudoComparison {
    let buckets = AgingBucket::ALL
        .into_iter()
        .filter_map(|b| match (current.bucket_total(b), previous.bucket_total(b)) {
            (Some(c), Some(p)) => Some((b, PeriodDelta::new(c, p))),
            _ => None,
        })
        .collect();

    RecaudoComparison {
        total_recaudo: PeriodDelta::new(current.total_recaudo, previous.total_recaudo),
        records: PeriodDelta::counts(current.records, previous.records),
        buckets,
    }
}
